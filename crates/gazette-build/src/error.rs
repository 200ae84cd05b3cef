//! Build error types.

use std::path::PathBuf;

use gazette_bundler::BundleError;
use gazette_css::StyleError;

use crate::pipeline::Stage;

/// Errors that can occur during a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing source: {0}")]
    MissingSource(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Errors raised by the output directory ledger.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to create output directory {path}: {message}")]
    Create { path: PathBuf, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("{path} was already written by {first}, refusing to overwrite from {second}")]
    Collision {
        path: PathBuf,
        first: Stage,
        second: Stage,
    },

    #[error("Output path escapes the output directory: {0}")]
    OutsideOutput(PathBuf),
}

/// Errors raised while rewriting the entry HTML.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    #[error("Entry HTML has no </head> to link stylesheets before")]
    MissingHead,

    #[error("Entry HTML has no <body> element")]
    MissingBody,

    #[error("Failed to render template: {0}")]
    Template(String),
}

/// A build failure and the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: BuildError,
}
