//! Stylesheet processor for gazette.
//!
//! Each stylesheet runs through a fixed chain: utility-class expansion
//! (`@tailwind` layers and `@apply`), then lightningcss for vendor prefixes
//! and minification.

pub mod error;
pub mod processor;
pub mod scanner;
pub mod utilities;

pub use error::StyleError;
pub use processor::{BrowserTargets, StyleProcessor};
pub use scanner::{extract_classes, scan_content};
