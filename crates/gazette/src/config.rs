//! `gazette.toml` loading.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gazette_build::{BuildConfig, Shim, ShimSource, StyleEntry};
use gazette_bundler::{string_literal, Loader, ModuleFormat};
use gazette_css::BrowserTargets;
use serde::Deserialize;

/// Configuration file structure (gazette.toml).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    site: SiteConfig,
    styles: Option<Vec<StyleEntry>>,
    #[serde(default)]
    css: CssConfig,
    #[serde(default)]
    bundle: BundleConfig,
    #[serde(default)]
    html: HtmlConfig,
    #[serde(default)]
    output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SiteConfig {
    #[serde(default = "default_root")]
    root: PathBuf,
    #[serde(default = "default_html")]
    html: PathBuf,
    #[serde(default = "default_script")]
    script: PathBuf,
    /// Empty string disables the public directory
    #[serde(default = "default_public")]
    public: String,
    content: Option<Vec<PathBuf>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            html: default_html(),
            script: default_script(),
            public: default_public(),
            content: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CssConfig {
    #[serde(default)]
    targets: BrowserTargets,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BundleConfig {
    format: Option<ModuleFormat>,
    /// Environment variables exposed to the bundle as string constants
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    define: BTreeMap<String, String>,
    #[serde(default)]
    external: Vec<String>,
    #[serde(default)]
    inject: Vec<PathBuf>,
    extensions: Option<Vec<String>>,
    #[serde(default)]
    node_paths: Vec<PathBuf>,
    public_path: Option<String>,
    assets_dir: Option<String>,
    output_name: Option<String>,
    #[serde(default)]
    loader: BTreeMap<String, String>,
    #[serde(default)]
    alias: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HtmlConfig {
    #[serde(default)]
    shims: Vec<ShimConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShimConfig {
    name: String,
    file: Option<PathBuf>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputConfig {
    #[serde(default = "default_output")]
    dir: PathBuf,
    #[serde(default = "default_true")]
    minify: bool,
    #[serde(default = "default_true")]
    redirects: bool,
    #[serde(default = "default_true")]
    metafile: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output(),
            minify: true,
            redirects: true,
            metafile: true,
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_html() -> PathBuf {
    PathBuf::from("index.html")
}
fn default_script() -> PathBuf {
    PathBuf::from("src/main.jsx")
}
fn default_public() -> String {
    "public".to_string()
}
fn default_output() -> PathBuf {
    PathBuf::from("dist")
}
fn default_true() -> bool {
    true
}

/// Command-line flags that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub output: Option<PathBuf>,
    pub minify: Option<bool>,
    pub format: Option<ModuleFormat>,
}

/// Load configuration from `path` if it exists.
/// Returns an error if the config file exists but is malformed.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        tracing::debug!("No {} found, using defaults", path.display());
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

impl ConfigFile {
    /// Build the pipeline configuration. `env` looks up the variables named
    /// in `[bundle] env`.
    pub fn into_build_config(
        self,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<BuildConfig> {
        let mut config = BuildConfig {
            root: self.site.root,
            output_dir: overrides.output.unwrap_or(self.output.dir),
            entry_html: self.site.html,
            entry_script: self.site.script,
            public_dir: (!self.site.public.is_empty()).then(|| PathBuf::from(self.site.public)),
            targets: self.css.targets,
            minify: overrides.minify.unwrap_or(self.output.minify),
            redirects: self.output.redirects,
            metafile: self.output.metafile,
            ..Default::default()
        };

        if let Some(styles) = self.styles {
            config.styles = styles;
        }
        if let Some(content) = self.site.content {
            config.content = content;
        }
        if let Some(format) = overrides.format.or(self.bundle.format) {
            config.format = format;
        }

        let bundle = &mut config.bundle;
        bundle.define = self.bundle.define;
        for name in &self.bundle.env {
            let value = string_literal(&env(name).unwrap_or_default());
            bundle
                .define
                .insert(format!("process.env.{}", name), value.clone());
            bundle
                .define
                .insert(format!("import.meta.env.{}", name), value);
        }
        bundle
            .define
            .entry("process.env.NODE_ENV".to_string())
            .or_insert_with(|| string_literal("production"));

        for (extension, name) in &self.bundle.loader {
            let Some(loader) = Loader::from_name(name) else {
                bail!("Unknown loader \"{}\" for {}", name, extension);
            };
            bundle.loaders.set(extension, loader);
        }

        bundle.resolve.aliases = self.bundle.alias;
        bundle.resolve.external = self.bundle.external;
        bundle.resolve.node_paths = self.bundle.node_paths;
        if let Some(extensions) = self.bundle.extensions {
            bundle.resolve.extensions = extensions;
        }
        bundle.inject = self.bundle.inject;
        if let Some(public_path) = self.bundle.public_path {
            bundle.public_path = public_path;
        }
        if let Some(assets_dir) = self.bundle.assets_dir {
            bundle.assets_dir = assets_dir;
        }
        bundle.output_name = self.bundle.output_name;

        for shim in self.html.shims {
            let source = match (shim.file, shim.code) {
                (Some(_), Some(_)) => {
                    bail!("Shim \"{}\" sets both file and code", shim.name)
                }
                (Some(file), None) => ShimSource::File(file),
                (None, Some(code)) => ShimSource::Code(code),
                (None, None) => ShimSource::Builtin,
            };
            config.shims.push(Shim {
                name: shim.name,
                source,
            });
        }

        Ok(config)
    }
}
