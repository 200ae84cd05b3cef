//! Build pipeline for single-page sites.
//!
//! A build copies the entry HTML and public files, processes stylesheets,
//! bundles the entry script and rewrites the HTML to reference the results.

pub mod config;
pub mod copier;
pub mod error;
pub mod html;
pub mod output;
pub mod pipeline;
pub mod source;

pub use config::{BuildConfig, BuildResult, Platform, Shim, ShimSource, StyleEntry};
pub use copier::{AssetCopier, CopyReport};
pub use error::{BuildError, FinalizeError, OutputError, PipelineError};
pub use html::{builtin_shim, HtmlFinalizer, HtmlPlan, ScriptTag, ShimScript};
pub use output::{Artifact, OutputDir};
pub use pipeline::{Pipeline, Stage, SPA_REDIRECTS};
pub use source::{slash_path, SourceTree};

pub use gazette_bundler::{BundleOptions, Loader, ModuleFormat};
pub use gazette_css::BrowserTargets;
