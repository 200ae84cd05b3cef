//! Bundler error types.

use std::path::PathBuf;

/// Errors that can occur while bundling a module graph.
///
/// Every variant carries the file it originated from so the pipeline can
/// surface the underlying message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Could not resolve \"{specifier}\" from {importer}")]
    Unresolved { specifier: String, importer: PathBuf },

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Syntax error in {path}: {message}")]
    Syntax { path: PathBuf, message: String },

    #[error("Transform error in {path}: {message}")]
    Transform { path: PathBuf, message: String },

    #[error("Invalid JSON in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("Unsupported construct in {path}: {message}")]
    Unsupported { path: PathBuf, message: String },

    #[error("No loader configured for {0}")]
    NoLoader(PathBuf),

    #[error("External module \"{0}\" cannot be referenced from an iife bundle")]
    ExternalInIife(String),

    #[error("Invalid define \"{key}\": {message}")]
    InvalidDefine { key: String, message: String },
}

impl BundleError {
    pub(crate) fn read(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
