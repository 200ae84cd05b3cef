//! Module graph discovery and bundle assembly.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analyze::analyze;
use crate::define::Defines;
use crate::error::BundleError;
use crate::linker::{assemble, external_binding, link_module, Assembly, Factory};
use crate::loader::{mime_for_path, Loader, LoaderRules};
use crate::resolver::{ResolveOptions, Resolved, Resolver};
use crate::transform::{minify_script, transform_script};

/// Module format of the emitted script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    /// Loaded with `<script type="module">`; externals stay as imports
    #[default]
    Esm,
    /// Self-contained classic script
    Iife,
}

/// Configuration for a bundle.
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub format: ModuleFormat,
    pub minify: bool,
    /// Compile-time substitutions: key -> JavaScript literal
    pub define: BTreeMap<String, String>,
    pub loaders: LoaderRules,
    pub resolve: ResolveOptions,
    /// Modules evaluated before the entry, relative to the root
    pub inject: Vec<PathBuf>,
    /// URL prefix for emitted assets
    pub public_path: String,
    /// Output directory for the script and emitted assets
    pub assets_dir: String,
    /// Script name; defaults to `<entry stem>.js`
    pub output_name: Option<String>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            format: ModuleFormat::default(),
            minify: false,
            define: BTreeMap::new(),
            loaders: LoaderRules::default(),
            resolve: ResolveOptions::default(),
            inject: Vec::new(),
            public_path: "/".to_string(),
            assets_dir: "assets".to_string(),
            output_name: None,
        }
    }
}

/// A file produced by the bundler, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub contents: Vec<u8>,
}

/// Dependency metadata for one bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafile {
    pub inputs: BTreeMap<String, MetaInput>,
    pub outputs: BTreeMap<String, MetaOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaInput {
    pub bytes: u64,
    pub imports: Vec<MetaImport>,
    pub loader: Loader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaImport {
    pub path: String,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaOutput {
    pub bytes: u64,
}

/// Result of bundling one entry.
#[derive(Debug, Clone)]
pub struct BundleOutput {
    /// The bundled script
    pub script: OutputFile,
    /// Files emitted by the `file` loader
    pub assets: Vec<OutputFile>,
    /// Stylesheets imported from scripts, in evaluation order
    pub css: Option<String>,
    pub metafile: Metafile,
}

/// A module loaded into the graph.
struct Module {
    path: PathBuf,
    loader: Loader,
    body: String,
    /// Internal dependencies in import order
    deps: Vec<usize>,
    css: Option<String>,
}

/// Walks an entry's import graph and produces a single script.
#[derive(Debug)]
pub struct Bundler {
    root: PathBuf,
    options: BundleOptions,
    resolver: Resolver,
    defines: Defines,
}

impl Bundler {
    /// Create a bundler for the project at `root`.
    pub fn new(root: impl AsRef<Path>, options: BundleOptions) -> Result<Self, BundleError> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .map_err(|e| BundleError::read(root, e))?;
        let defines = Defines::new(options.define.clone())?;
        let resolver = Resolver::new(root.clone(), options.resolve.clone());

        Ok(Self {
            root,
            options,
            resolver,
            defines,
        })
    }

    /// Bundle `entry` (relative to the root) and everything it imports.
    pub fn bundle(&self, entry: &Path) -> Result<BundleOutput, BundleError> {
        let mut graph = Graph::default();

        let mut roots = Vec::new();
        for inject in &self.options.inject {
            roots.push(self.entry_path(inject)?);
        }
        let entry_path = self.entry_path(entry)?;
        roots.push(entry_path.clone());

        let root_ids: Vec<usize> = roots.iter().map(|p| graph.intern(p)).collect();

        let mut assets = Vec::new();
        let mut metafile = Metafile::default();

        while let Some(id) = graph.queue.pop_front() {
            let path = graph.paths[id].clone();
            let (module, input) = self.load(&path, &mut graph, &mut assets)?;
            metafile.inputs.insert(self.display_path(&path), input);
            graph.modules.insert(id, module);
        }

        let (preload, entry_id) = match root_ids.split_last() {
            Some((last, rest)) => (rest.to_vec(), *last),
            None => (Vec::new(), 0),
        };

        let mut factories = Vec::with_capacity(graph.paths.len());
        for id in 0..graph.paths.len() {
            let module = graph
                .modules
                .get(&id)
                .ok_or_else(|| BundleError::read(&graph.paths[id], "module was never loaded"))?;
            factories.push(Factory {
                label: self.display_path(&module.path),
                body: module.body.clone(),
            });
        }

        let css = collect_css(&graph, &root_ids);

        let iife = self.options.format == ModuleFormat::Iife;
        let mut code = assemble(&Assembly {
            factories: &factories,
            preload: &preload,
            entry: entry_id,
            externals: &graph.externals,
            iife,
        });

        let script_path = self.script_path(&entry_path);
        if self.options.minify {
            let source_type = if iife {
                SourceType::cjs()
            } else {
                SourceType::mjs()
            };
            code = minify_script(Path::new(&script_path), &code, source_type)?;
        }

        metafile.outputs.insert(
            script_path.clone(),
            MetaOutput {
                bytes: code.len() as u64,
            },
        );
        for asset in &assets {
            metafile.outputs.insert(
                asset.path.clone(),
                MetaOutput {
                    bytes: asset.contents.len() as u64,
                },
            );
        }

        tracing::debug!(
            "Bundled {} modules into {} ({} bytes)",
            factories.len(),
            script_path,
            code.len()
        );

        Ok(BundleOutput {
            script: OutputFile {
                path: script_path,
                contents: code.into_bytes(),
            },
            assets,
            css,
            metafile,
        })
    }

    fn entry_path(&self, path: &Path) -> Result<PathBuf, BundleError> {
        let full = self.root.join(path);
        full.canonicalize().map_err(|e| BundleError::read(&full, e))
    }

    /// Load one module and enqueue its dependencies.
    fn load(
        &self,
        path: &Path,
        graph: &mut Graph,
        assets: &mut Vec<OutputFile>,
    ) -> Result<(Module, MetaInput), BundleError> {
        let loader = self
            .options
            .loaders
            .for_path(path)
            .ok_or_else(|| BundleError::NoLoader(path.to_path_buf()))?;

        let bytes = fs::read(path).map_err(|e| BundleError::read(path, e))?;
        let mut module = Module {
            path: path.to_path_buf(),
            loader,
            body: String::new(),
            deps: Vec::new(),
            css: None,
        };
        let mut imports = Vec::new();

        match loader {
            Loader::Js | Loader::Jsx | Loader::Ts | Loader::Tsx => {
                let source = utf8(path, bytes.clone())?;
                let code = transform_script(path, &source, loader)?;
                let code = self.defines.apply(path, &code)?;
                let analysis = analyze(path, &code)?;

                let mut targets = HashMap::new();
                for specifier in analysis.specifiers() {
                    match self.resolver.resolve(&specifier, path)? {
                        Resolved::Module(dep) => {
                            let id = graph.intern(&dep);
                            if !module.deps.contains(&id) {
                                module.deps.push(id);
                            }
                            imports.push(MetaImport {
                                path: self.display_path(&dep),
                                external: false,
                            });
                            targets.insert(specifier, format!("__require({})", id));
                        }
                        Resolved::External(name) => {
                            if self.options.format == ModuleFormat::Iife {
                                return Err(BundleError::ExternalInIife(name));
                            }
                            let index = graph.external(&name);
                            imports.push(MetaImport {
                                path: name,
                                external: true,
                            });
                            targets.insert(specifier, external_binding(index));
                        }
                    }
                }

                module.body = link_module(&code, &analysis, &targets);
            }
            Loader::Json => {
                let text = utf8(path, bytes.clone())?;
                serde_json::from_str::<serde_json::Value>(&text).map_err(|e| {
                    BundleError::Json {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
                module.body = format!("module.exports = {};\n", text.trim());
            }
            Loader::Text => {
                let text = utf8(path, bytes.clone())?;
                module.body = format!("module.exports = {};\n", json_string(&text));
            }
            Loader::DataUrl => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                let url = format!("data:{};base64,{}", mime_for_path(path), encoded);
                module.body = format!("module.exports = {};\n", json_string(&url));
            }
            Loader::File => {
                let name = hashed_name(path, &bytes);
                let relative = join_url(&self.options.assets_dir, &name);
                let url = join_url(&self.options.public_path, &relative);
                assets.push(OutputFile {
                    path: relative,
                    contents: bytes.clone(),
                });
                module.body = format!("module.exports = {};\n", json_string(&url));
            }
            Loader::Css => {
                module.css = Some(utf8(path, bytes.clone())?);
                module.body = "module.exports = {};\n".to_string();
            }
            Loader::Empty => {
                module.body = "module.exports = {};\n".to_string();
            }
        }

        let input = MetaInput {
            bytes: bytes.len() as u64,
            imports,
            loader: module.loader,
        };
        Ok((module, input))
    }

    fn script_path(&self, entry: &Path) -> String {
        let name = match &self.options.output_name {
            Some(name) => name.clone(),
            None => {
                let stem = entry
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("bundle");
                format!("{}.js", stem)
            }
        };
        join_url(&self.options.assets_dir, &name)
    }

    /// Stable, root-relative display form of a module path.
    fn display_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Module graph under construction. Ids follow discovery order.
#[derive(Default)]
struct Graph {
    paths: Vec<PathBuf>,
    ids: HashMap<PathBuf, usize>,
    queue: VecDeque<usize>,
    modules: HashMap<usize, Module>,
    externals: Vec<String>,
}

impl Graph {
    fn intern(&mut self, path: &Path) -> usize {
        if let Some(id) = self.ids.get(path) {
            return *id;
        }
        let id = self.paths.len();
        self.paths.push(path.to_path_buf());
        self.ids.insert(path.to_path_buf(), id);
        self.queue.push_back(id);
        id
    }

    fn external(&mut self, name: &str) -> usize {
        match self.externals.iter().position(|e| e == name) {
            Some(index) => index,
            None => {
                self.externals.push(name.to_string());
                self.externals.len() - 1
            }
        }
    }
}

/// Stylesheets in the order their importing modules finish evaluating.
fn collect_css(graph: &Graph, roots: &[usize]) -> Option<String> {
    fn visit(graph: &Graph, id: usize, seen: &mut HashSet<usize>, out: &mut Vec<usize>) {
        if !seen.insert(id) {
            return;
        }
        if let Some(module) = graph.modules.get(&id) {
            for dep in &module.deps {
                visit(graph, *dep, seen, out);
            }
        }
        out.push(id);
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for root in roots {
        visit(graph, *root, &mut seen, &mut order);
    }

    let sheets: Vec<&str> = order
        .iter()
        .filter_map(|id| graph.modules.get(id)?.css.as_deref())
        .collect();

    if sheets.is_empty() {
        None
    } else {
        Some(sheets.join("\n"))
    }
}

fn utf8(path: &Path, bytes: Vec<u8>) -> Result<String, BundleError> {
    String::from_utf8(bytes).map_err(|e| BundleError::read(path, e))
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// `logo.webp` -> `logo-1a2b3c4d.webp`
fn hashed_name(path: &Path, bytes: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}.{}", stem, &digest[..8], ext),
        None => format!("{}-{}", stem, &digest[..8]),
    }
}

fn join_url(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for (path, contents) in files {
            let full = temp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, contents).unwrap();
        }
        temp
    }

    fn bundle(temp: &TempDir, options: BundleOptions) -> Result<BundleOutput, BundleError> {
        Bundler::new(temp.path(), options)?.bundle(Path::new("src/main.js"))
    }

    fn script(output: &BundleOutput) -> String {
        String::from_utf8(output.script.contents.clone()).unwrap()
    }

    #[test]
    fn bundles_relative_imports() {
        let temp = project(&[
            ("src/main.js", "import { greet } from './greet';\nconsole.log(greet('web'));\n"),
            ("src/greet.js", "export function greet(name) { return 'hi ' + name; }\n"),
        ]);

        let output = bundle(&temp, BundleOptions::default()).unwrap();
        let code = script(&output);

        assert_eq!(output.script.path, "assets/main.js");
        assert!(code.contains("// src/main.js"));
        assert!(code.contains("// src/greet.js"));
        assert!(code.contains("__require(1)"));
        assert!(!code.contains("import {"));
        assert_eq!(output.css, None);
    }

    #[test]
    fn substitutes_environment_defines() {
        let temp = project(&[(
            "src/main.js",
            "const region = process.env.VITE_NHOST_REGION;\nconsole.log(region);\n",
        )]);
        let mut options = BundleOptions::default();
        options.define.insert(
            "process.env.VITE_NHOST_REGION".to_string(),
            "\"eu-central-1\"".to_string(),
        );

        let code = script(&bundle(&temp, options).unwrap());

        assert!(code.contains("eu-central-1"));
        assert!(!code.contains("process.env.VITE_NHOST_REGION"));
    }

    #[test]
    fn define_keys_inside_strings_are_kept() {
        let temp = project(&[(
            "src/main.js",
            "console.log(\"mode is process.env.NODE_ENV\", process.env.NODE_ENV);\n",
        )]);
        let mut options = BundleOptions::default();
        options
            .define
            .insert("process.env.NODE_ENV".to_string(), "\"production\"".to_string());

        let code = script(&bundle(&temp, options).unwrap());

        assert!(code.contains("\"mode is process.env.NODE_ENV\", \"production\""));
    }

    #[test]
    fn require_text_inside_strings_is_not_a_dependency() {
        let temp = project(&[(
            "src/main.js",
            "const help = \"call require('nope') to load\";\nconsole.log(help);\n",
        )]);

        let output = bundle(&temp, BundleOptions::default()).unwrap();

        assert!(script(&output).contains("call require('nope') to load"));
        assert!(output.metafile.inputs["src/main.js"].imports.is_empty());
    }

    #[test]
    fn imported_bindings_observe_updates() {
        let temp = project(&[
            (
                "src/main.js",
                "import { count, inc } from './counter';\ninc();\nconsole.log('COUNT', count);\n",
            ),
            (
                "src/counter.js",
                "export let count = 0;\nexport function inc() { count++; }\n",
            ),
        ]);

        let code = script(&bundle(&temp, BundleOptions::default()).unwrap());

        assert!(code.contains("console.log(\"COUNT\", __gz_0.count);"));
        assert!(code.contains("(0, __gz_0.inc)();"));
        assert!(!code.contains("var count = "));
    }

    #[test]
    fn output_is_deterministic() {
        let temp = project(&[
            ("src/main.js", "import a from './a';\nimport b from './b';\nconsole.log(a, b);\n"),
            ("src/a.js", "export default 'a';\n"),
            ("src/b.js", "import a from './a';\nexport default a + 'b';\n"),
        ]);

        let first = bundle(&temp, BundleOptions::default()).unwrap();
        let second = bundle(&temp, BundleOptions::default()).unwrap();

        assert_eq!(first.script, second.script);
        assert_eq!(first.metafile, second.metafile);
    }

    #[test]
    fn collects_imported_css_in_evaluation_order() {
        let temp = project(&[
            ("src/main.js", "import './app.js';\nimport './main.css';\n"),
            ("src/app.js", "import './app.css';\n"),
            ("src/app.css", ".app { color: red; }"),
            ("src/main.css", "body { margin: 0; }"),
        ]);

        let output = bundle(&temp, BundleOptions::default()).unwrap();

        assert_eq!(
            output.css.as_deref(),
            Some(".app { color: red; }\nbody { margin: 0; }")
        );
    }

    #[test]
    fn inlines_small_assets_and_emits_files() {
        let temp = project(&[
            ("src/main.js", "import logo from './logo.svg';\nimport font from './font.woff2';\nconsole.log(logo, font);\n"),
            ("src/logo.svg", "<svg></svg>"),
            ("src/font.woff2", "wOF2"),
        ]);

        let output = bundle(&temp, BundleOptions::default()).unwrap();
        let code = script(&output);

        assert!(code.contains("data:image/svg+xml;base64,"));
        assert_eq!(output.assets.len(), 1);
        assert!(output.assets[0].path.starts_with("assets/font-"));
        assert!(output.assets[0].path.ends_with(".woff2"));
        assert!(code.contains(&format!("\"/{}\"", output.assets[0].path)));
    }

    #[test]
    fn embeds_json_modules() {
        let temp = project(&[
            ("src/main.js", "import config from './config.json';\nconsole.log(config.name);\n"),
            ("src/config.json", "{ \"name\": \"gazette\" }"),
        ]);

        let code = script(&bundle(&temp, BundleOptions::default()).unwrap());

        assert!(code.contains("module.exports = { \"name\": \"gazette\" };"));
    }

    #[test]
    fn rejects_invalid_json() {
        let temp = project(&[
            ("src/main.js", "import config from './config.json';\n"),
            ("src/config.json", "{ name: }"),
        ]);

        let result = bundle(&temp, BundleOptions::default());

        assert!(matches!(result, Err(BundleError::Json { .. })));
    }

    #[test]
    fn reports_unresolved_imports() {
        let temp = project(&[("src/main.js", "import missing from './missing';\n")]);

        match bundle(&temp, BundleOptions::default()) {
            Err(BundleError::Unresolved { specifier, .. }) => assert_eq!(specifier, "./missing"),
            other => panic!("expected unresolved error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn aliases_replace_packages() {
        let temp = project(&[
            ("src/main.js", "import decode from 'jwt-decode';\nconsole.log(decode);\n"),
            ("src/shims/jwt-decode.js", "export default function decode() {}\n"),
        ]);
        let mut options = BundleOptions::default();
        options.resolve.aliases.insert(
            "jwt-decode".to_string(),
            PathBuf::from("src/shims/jwt-decode.js"),
        );

        let output = bundle(&temp, options).unwrap();

        assert!(output
            .metafile
            .inputs
            .contains_key("src/shims/jwt-decode.js"));
    }

    #[test]
    fn externals_stay_imports_in_esm() {
        let temp = project(&[("src/main.js", "import React from 'react';\nconsole.log(React);\n")]);
        let mut options = BundleOptions::default();
        options.resolve.external.push("react".to_string());

        let code = script(&bundle(&temp, options.clone()).unwrap());
        assert!(code.starts_with("import * as __gz_ext0 from \"react\";"));

        options.format = ModuleFormat::Iife;
        let result = bundle(&temp, options);
        assert!(matches!(result, Err(BundleError::ExternalInIife(_))));
    }

    #[test]
    fn iife_format_wraps_bundle() {
        let temp = project(&[("src/main.js", "console.log('hi');\n")]);
        let options = BundleOptions {
            format: ModuleFormat::Iife,
            ..BundleOptions::default()
        };

        let code = script(&bundle(&temp, options).unwrap());

        assert!(code.starts_with("(function () {"));
    }

    #[test]
    fn injected_modules_run_before_entry() {
        let temp = project(&[
            ("src/main.js", "console.log('main');\n"),
            ("src/shim.js", "globalThis.shimmed = true;\n"),
        ]);
        let options = BundleOptions {
            inject: vec![PathBuf::from("src/shim.js")],
            ..BundleOptions::default()
        };

        let code = script(&bundle(&temp, options).unwrap());

        assert!(code.contains("__require(0);\n__require(1);\n"));
    }

    #[test]
    fn minified_output_is_smaller() {
        let temp = project(&[(
            "src/main.js",
            "function greet(name) {\n    return 'hello ' + name;\n}\nconsole.log(greet('x'));\n",
        )]);

        let plain = bundle(&temp, BundleOptions::default()).unwrap();
        let minified = bundle(
            &temp,
            BundleOptions {
                minify: true,
                ..BundleOptions::default()
            },
        )
        .unwrap();

        assert!(minified.script.contents.len() < plain.script.contents.len());
    }

    #[test]
    fn metafile_records_inputs_and_outputs() {
        let temp = project(&[
            ("src/main.js", "import './style.css';\n"),
            ("src/style.css", "a { color: blue; }"),
        ]);

        let output = bundle(&temp, BundleOptions::default()).unwrap();
        let main = &output.metafile.inputs["src/main.js"];

        assert_eq!(main.loader, Loader::Jsx);
        assert_eq!(
            main.imports,
            vec![MetaImport {
                path: "src/style.css".to_string(),
                external: false,
            }]
        );
        assert!(output.metafile.outputs.contains_key("assets/main.js"));
    }

    #[test]
    fn joins_urls() {
        assert_eq!(join_url("/", "assets/a.png"), "/assets/a.png");
        assert_eq!(join_url("assets", "a.png"), "assets/a.png");
        assert_eq!(join_url("https://cdn.example/", "assets/a.png"), "https://cdn.example/assets/a.png");
    }
}
