//! Source tree validation.

use std::fs;
use std::path::{Path, PathBuf};

use gazette_bundler::ModuleFormat;

use crate::config::{BuildConfig, ShimSource};
use crate::error::BuildError;
use crate::html::{builtin_shim, ShimScript};

/// A stylesheet source with its resolved location.
#[derive(Debug, Clone)]
pub struct StyleSource {
    pub source: PathBuf,
    pub outputs: Vec<PathBuf>,
}

impl StyleSource {
    /// The destination referenced by the `<link>` tag.
    pub fn primary(&self) -> Option<&Path> {
        self.outputs.first().map(PathBuf::as_path)
    }
}

/// The validated inputs of one build. All paths are absolute.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub entry_html: PathBuf,
    /// Entry script relative to the root, as the HTML refers to it
    pub entry_script: PathBuf,
    /// Configured public directory; may not exist
    pub public_dir: Option<PathBuf>,
    pub styles: Vec<StyleSource>,
    pub content: Vec<PathBuf>,
    pub shims: Vec<ShimScript>,
}

impl SourceTree {
    /// Validate the configuration against the file system.
    pub fn resolve(config: &BuildConfig) -> Result<Self, BuildError> {
        let entry_html = existing_file(config.resolve(&config.entry_html))?;
        existing_file(config.resolve(&config.entry_script))?;

        let mut styles = Vec::with_capacity(config.styles.len());
        for entry in &config.styles {
            if entry.outputs.is_empty() {
                return Err(BuildError::InvalidConfig(format!(
                    "stylesheet {} has no outputs",
                    entry.source.display()
                )));
            }
            styles.push(StyleSource {
                source: existing_file(config.resolve(&entry.source))?,
                outputs: entry.outputs.clone(),
            });
        }

        for inject in &config.bundle.inject {
            existing_file(config.resolve(inject))?;
        }

        if config.format == ModuleFormat::Iife && !config.bundle.resolve.external.is_empty() {
            return Err(BuildError::InvalidConfig(
                "external modules require the esm format".to_string(),
            ));
        }

        let mut shims = Vec::with_capacity(config.shims.len());
        for shim in &config.shims {
            let code = match &shim.source {
                ShimSource::Builtin => builtin_shim(&shim.name)
                    .ok_or_else(|| {
                        BuildError::InvalidConfig(format!("unknown builtin shim \"{}\"", shim.name))
                    })?
                    .to_string(),
                ShimSource::Code(code) => code.clone(),
                ShimSource::File(path) => {
                    let path = existing_file(config.resolve(path))?;
                    fs::read_to_string(&path).map_err(|e| BuildError::Read {
                        path: path.clone(),
                        message: e.to_string(),
                    })?
                }
            };
            shims.push(ShimScript::new(&shim.name, code)?);
        }

        Ok(Self {
            root: config.root.clone(),
            output_dir: config.resolve(&config.output_dir),
            entry_html,
            entry_script: config.entry_script.clone(),
            public_dir: config.public_dir.as_ref().map(|p| config.resolve(p)),
            styles,
            content: config.content.iter().map(|p| config.resolve(p)).collect(),
            shims,
        })
    }
}

fn existing_file(path: PathBuf) -> Result<PathBuf, BuildError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(BuildError::MissingSource(path))
    }
}

/// Display a path with forward slashes, for URLs and logs.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
