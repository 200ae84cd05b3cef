//! Script bundler for gazette.
//!
//! Follows the import graph of one entry module, compiles JSX and TypeScript,
//! substitutes compile-time defines and links everything into a single
//! browser script:
//!
//! ```text
//! src/main.jsx ──► resolve ──► transform ──► define ──► link ──► assets/main.js
//!                     │                                   │
//!                     └── css / file / dataurl loaders ───┘
//! ```

pub mod analyze;
pub mod bundler;
pub mod define;
pub mod error;
pub mod linker;
pub mod loader;
pub mod resolver;
pub mod transform;

pub use bundler::{
    BundleOptions, BundleOutput, Bundler, MetaImport, MetaInput, MetaOutput, Metafile,
    ModuleFormat, OutputFile,
};
pub use define::{string_literal, Defines};
pub use error::BundleError;
pub use loader::{mime_for_path, Loader, LoaderRules};
pub use resolver::{ResolveOptions, Resolved, Resolver};
