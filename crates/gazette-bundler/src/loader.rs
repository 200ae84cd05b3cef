//! Per-extension loader rules.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// How a file reached through an import is embedded in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    /// Plain JavaScript module
    Js,
    /// JavaScript with embedded JSX markup
    Jsx,
    /// TypeScript
    Ts,
    /// TypeScript with JSX markup
    Tsx,
    /// JSON document exported as the module value
    Json,
    /// UTF-8 text exported as a string
    Text,
    /// Stylesheet collected into the bundle's CSS output
    Css,
    /// Inlined as a `data:` URI
    #[serde(rename = "dataurl")]
    DataUrl,
    /// Emitted as a separate file, exporting its public URL
    File,
    /// Resolves to an empty module
    Empty,
}

impl Loader {
    /// Parse a loader name as written in configuration.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "js" | "javascript" => Some(Self::Js),
            "jsx" => Some(Self::Jsx),
            "ts" | "typescript" => Some(Self::Ts),
            "tsx" => Some(Self::Tsx),
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            "css" => Some(Self::Css),
            "dataurl" => Some(Self::DataUrl),
            "file" => Some(Self::File),
            "empty" => Some(Self::Empty),
            _ => None,
        }
    }

    /// Whether the script dialect contains JSX markup.
    pub fn has_jsx(&self) -> bool {
        matches!(self, Self::Jsx | Self::Tsx)
    }

    /// Whether the script dialect is TypeScript.
    pub fn is_typescript(&self) -> bool {
        matches!(self, Self::Ts | Self::Tsx)
    }
}

/// Mapping from file extension (without the dot) to loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderRules {
    rules: BTreeMap<String, Loader>,
}

impl LoaderRules {
    /// Rules with no entries.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Set the loader for an extension. Accepts `".svg"` or `"svg"`.
    pub fn set(&mut self, extension: &str, loader: Loader) {
        self.rules
            .insert(extension.trim_start_matches('.').to_lowercase(), loader);
    }

    /// Builder-style variant of [`LoaderRules::set`].
    pub fn with(mut self, extension: &str, loader: Loader) -> Self {
        self.set(extension, loader);
        self
    }

    /// Loader for a path, chosen by its extension.
    pub fn for_path(&self, path: &Path) -> Option<Loader> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        self.rules.get(&ext.to_lowercase()).copied()
    }
}

impl Default for LoaderRules {
    fn default() -> Self {
        Self::empty()
            .with("js", Loader::Jsx)
            .with("jsx", Loader::Jsx)
            .with("mjs", Loader::Js)
            .with("cjs", Loader::Js)
            .with("ts", Loader::Ts)
            .with("mts", Loader::Ts)
            .with("tsx", Loader::Tsx)
            .with("json", Loader::Json)
            .with("css", Loader::Css)
            .with("txt", Loader::Text)
            .with("svg", Loader::DataUrl)
            .with("png", Loader::DataUrl)
            .with("jpg", Loader::DataUrl)
            .with("jpeg", Loader::DataUrl)
            .with("gif", Loader::DataUrl)
            .with("webp", Loader::File)
            .with("woff", Loader::File)
            .with("woff2", Loader::File)
            .with("ttf", Loader::File)
            .with("eot", Loader::File)
    }
}

/// Content type implied by a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" | "cjs" => "text/javascript",
        "json" | "map" => "application/json",
        "txt" => "text/plain",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
