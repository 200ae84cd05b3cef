//! Build configuration.

use std::path::{Path, PathBuf};

use gazette_bundler::{BundleOptions, ModuleFormat};
use gazette_css::BrowserTargets;
use serde::{Deserialize, Serialize};

use crate::output::Artifact;

/// Configuration for one build. Constructed once and never mutated by the
/// pipeline.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root; relative paths resolve against it
    pub root: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// HTML document served as the application shell
    pub entry_html: PathBuf,

    /// Entry module of the script bundle
    pub entry_script: PathBuf,

    /// Static files copied verbatim into the output root
    pub public_dir: Option<PathBuf>,

    /// Stylesheets and where their processed output goes
    pub styles: Vec<StyleEntry>,

    /// Files and directories scanned for utility class names
    pub content: Vec<PathBuf>,

    /// Browser versions for vendor prefixing
    pub targets: BrowserTargets,

    /// Minify CSS and JS output
    pub minify: bool,

    pub platform: Platform,

    pub format: ModuleFormat,

    /// Resolution, loaders, defines and asset naming for the bundle
    pub bundle: BundleOptions,

    /// Inline scripts injected at the top of `<body>`
    pub shims: Vec<Shim>,

    /// Emit a `_redirects` file routing every path to `index.html`
    pub redirects: bool,

    /// Emit `meta.json` with bundle inputs and outputs
    pub metafile: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            output_dir: PathBuf::from("dist"),
            entry_html: PathBuf::from("index.html"),
            entry_script: PathBuf::from("src/main.jsx"),
            public_dir: Some(PathBuf::from("public")),
            styles: vec![StyleEntry {
                source: PathBuf::from("src/index.css"),
                outputs: vec![PathBuf::from("index.css"), PathBuf::from("assets/index.css")],
            }],
            content: vec![PathBuf::from("index.html"), PathBuf::from("src")],
            targets: BrowserTargets::default(),
            minify: true,
            platform: Platform::Browser,
            format: ModuleFormat::Esm,
            bundle: BundleOptions::default(),
            shims: Vec::new(),
            redirects: true,
            metafile: true,
        }
    }
}

impl BuildConfig {
    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// One source stylesheet and its destinations, relative to the output
/// directory. The first destination is the one linked from the HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub source: PathBuf,
    pub outputs: Vec<PathBuf>,
}

/// Runtime the bundle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Browser,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Browser => write!(f, "browser"),
        }
    }
}

/// An inline script injected ahead of the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shim {
    pub name: String,
    pub source: ShimSource,
}

/// Where a shim's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShimSource {
    /// One of the shims shipped with gazette, looked up by name
    Builtin,
    /// Code given directly in configuration
    Code(String),
    /// A file relative to the project root
    File(PathBuf),
}

impl Shim {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: ShimSource::Builtin,
        }
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Every file written, in write order
    pub artifacts: Vec<Artifact>,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_conventional_layout() {
        let config = BuildConfig::default();

        assert_eq!(config.output_dir, PathBuf::from("dist"));
        assert_eq!(config.entry_script, PathBuf::from("src/main.jsx"));
        assert_eq!(config.styles[0].outputs[0], PathBuf::from("index.css"));
        assert_eq!(config.format, ModuleFormat::Esm);
    }

    #[test]
    fn resolves_relative_paths_against_root() {
        let config = BuildConfig {
            root: PathBuf::from("/site"),
            ..Default::default()
        };

        assert_eq!(config.resolve(Path::new("public")), PathBuf::from("/site/public"));
        assert_eq!(config.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
