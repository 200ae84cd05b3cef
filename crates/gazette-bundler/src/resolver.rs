//! Module specifier resolution.
//!
//! Resolution order for a specifier:
//! 1. the alias table (exact match, or `alias/sub/path`)
//! 2. external patterns
//! 3. relative and root-absolute paths
//! 4. bare package names through `node_modules`

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::Value;

use crate::error::BundleError;

/// Export conditions honoured in `package.json` `exports`, in priority order.
const CONDITIONS: &[&str] = &["browser", "import", "module", "default", "require"];

/// Options controlling resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Specifier overrides: "jwt-decode" -> "src/shims/jwt-decode.js"
    pub aliases: BTreeMap<String, PathBuf>,

    /// Specifiers left out of the bundle ("*.woff", "react", "lodash/*")
    pub external: Vec<String>,

    /// Extensions tried when a specifier has none
    pub extensions: Vec<String>,

    /// Extra directories searched for packages, relative to the root
    pub node_paths: Vec<PathBuf>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            external: Vec::new(),
            extensions: [".js", ".jsx", ".mjs", ".ts", ".tsx", ".json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            node_paths: Vec::new(),
        }
    }
}

/// Outcome of resolving a specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A file on disk (canonical path)
    Module(PathBuf),
    /// Left as a runtime import
    External(String),
}

/// Resolves import specifiers to files.
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    options: ResolveOptions,
}

impl Resolver {
    /// Create a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, options: ResolveOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    /// Resolve `specifier` as imported from the file `importer`.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Result<Resolved, BundleError> {
        let unresolved = || BundleError::Unresolved {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        };

        if let Some(target) = self.alias_target(specifier) {
            tracing::debug!("Alias {} -> {}", specifier, target.display());
            return self
                .try_path(&target)
                .map(Resolved::Module)
                .ok_or_else(unresolved);
        }

        if self.is_external(specifier) {
            return Ok(Resolved::External(specifier.to_string()));
        }

        let found = if specifier.starts_with("./") || specifier.starts_with("../") {
            let base = importer.parent().unwrap_or(Path::new(""));
            self.try_path(&base.join(specifier))
        } else if let Some(rest) = specifier.strip_prefix('/') {
            self.try_path(&self.root.join(rest))
        } else {
            self.resolve_package(specifier, importer)
        };

        found.map(Resolved::Module).ok_or_else(unresolved)
    }

    /// Look up the alias table. Aliases are pure specifier to path mappings.
    fn alias_target(&self, specifier: &str) -> Option<PathBuf> {
        if let Some(path) = self.options.aliases.get(specifier) {
            return Some(self.root.join(path));
        }

        self.options.aliases.iter().find_map(|(key, path)| {
            specifier
                .strip_prefix(key.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|rest| self.root.join(path).join(rest))
        })
    }

    fn is_external(&self, specifier: &str) -> bool {
        self.options
            .external
            .iter()
            .any(|pattern| matches_pattern(pattern, specifier))
    }

    /// Resolve a bare package specifier such as `react` or `@nhost/react/hooks`.
    fn resolve_package(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let (name, subpath) = split_package(specifier)?;

        let search_dirs = importer
            .parent()
            .into_iter()
            .flat_map(|dir| dir.ancestors())
            .map(|dir| dir.join("node_modules"))
            .chain(self.options.node_paths.iter().map(|p| self.root.join(p)));

        for modules_dir in search_dirs {
            let package_dir = modules_dir.join(name);
            if !package_dir.is_dir() {
                continue;
            }

            let manifest = read_manifest(&package_dir);

            if let Some(exports) = manifest.as_ref().and_then(|m| m.get("exports")) {
                let key = match subpath {
                    Some(sub) => format!("./{}", sub),
                    None => ".".to_string(),
                };
                if let Some(target) = resolve_exports(exports, &key) {
                    if let Some(found) = self.try_path(&package_dir.join(target)) {
                        return Some(found);
                    }
                }
            }

            let found = match subpath {
                Some(sub) => self.try_path(&package_dir.join(sub)),
                None => self.try_package_entry(&package_dir, manifest.as_ref()),
            };

            if found.is_some() {
                return found;
            }
        }

        None
    }

    /// Entry file of a package directory from its manifest fields.
    fn try_package_entry(&self, dir: &Path, manifest: Option<&Value>) -> Option<PathBuf> {
        if let Some(manifest) = manifest {
            for field in ["browser", "module", "main"] {
                if let Some(entry) = manifest.get(field).and_then(Value::as_str) {
                    if let Some(found) = self.try_file(&dir.join(entry)) {
                        return Some(found);
                    }
                    if let Some(found) = self.try_index(&dir.join(entry)) {
                        return Some(found);
                    }
                }
            }
        }
        self.try_index(dir)
    }

    /// Probe a path as a file, then as a directory.
    fn try_path(&self, path: &Path) -> Option<PathBuf> {
        let path = normalize(path);
        if let Some(found) = self.try_file(&path) {
            return Some(found);
        }
        if path.is_dir() {
            return self.try_package_entry(&path, read_manifest(&path).as_ref());
        }
        None
    }

    fn try_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return fs::canonicalize(path).ok();
        }

        for ext in &self.options.extensions {
            let mut candidate = OsString::from(path.as_os_str());
            candidate.push(ext);
            let candidate = PathBuf::from(candidate);
            if candidate.is_file() {
                return fs::canonicalize(candidate).ok();
            }
        }

        None
    }

    fn try_index(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }
        self.try_file(&dir.join("index"))
    }
}

/// Match a specifier against an external pattern.
///
/// Supports exact names, a leading `*` (suffix match) and a trailing `*`
/// (prefix match).
pub fn matches_pattern(pattern: &str, specifier: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        specifier.ends_with(suffix)
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        specifier.starts_with(prefix)
    } else {
        pattern == specifier
    }
}

/// Split `@scope/name/sub/path` into (`@scope/name`, `Some("sub/path")`).
fn split_package(specifier: &str) -> Option<(&str, Option<&str>)> {
    if specifier.is_empty() {
        return None;
    }

    let name_end = if specifier.starts_with('@') {
        let first = specifier.find('/')?;
        specifier[first + 1..]
            .find('/')
            .map(|i| first + 1 + i)
            .unwrap_or(specifier.len())
    } else {
        specifier.find('/').unwrap_or(specifier.len())
    };

    let name = &specifier[..name_end];
    let subpath = specifier
        .get(name_end + 1..)
        .filter(|s| !s.is_empty());

    Some((name, subpath))
}

fn read_manifest(dir: &Path) -> Option<Value> {
    let content = fs::read_to_string(dir.join("package.json")).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring malformed {}/package.json: {}", dir.display(), e);
            None
        }
    }
}

/// Resolve a `package.json` `exports` value for a subpath key (`.` or `./x`).
fn resolve_exports(exports: &Value, key: &str) -> Option<String> {
    match exports {
        Value::String(target) if key == "." => Some(target.clone()),
        Value::Array(items) => items.iter().find_map(|item| resolve_exports(item, key)),
        Value::Object(map) if map.keys().any(|k| k.starts_with('.')) => {
            if let Some(target) = map.get(key) {
                return resolve_conditions(target);
            }

            map.iter().find_map(|(pattern, target)| {
                let prefix = pattern.strip_suffix('*')?;
                let rest = key.strip_prefix(prefix)?;
                resolve_conditions(target).map(|t| t.replace('*', rest))
            })
        }
        Value::Object(_) if key == "." => resolve_conditions(exports),
        _ => None,
    }
}

fn resolve_conditions(value: &Value) -> Option<String> {
    match value {
        Value::String(target) => Some(target.clone()),
        Value::Array(items) => items.iter().find_map(resolve_conditions),
        Value::Object(map) => CONDITIONS
            .iter()
            .filter_map(|cond| map.get(*cond))
            .find_map(resolve_conditions),
        _ => None,
    }
}

/// Lexically normalize `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
