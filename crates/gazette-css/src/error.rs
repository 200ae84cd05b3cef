//! Stylesheet error types.

/// Errors raised while processing a stylesheet.
#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("Unknown @tailwind layer \"{layer}\" in {name}")]
    UnknownLayer { name: String, layer: String },

    #[error("Unknown utility \"{class}\" in @apply in {name}")]
    UnknownUtility { name: String, class: String },

    #[error("CSS parse error in {name}: {message}")]
    Parse { name: String, message: String },

    #[error("CSS transform error in {name}: {message}")]
    Transform { name: String, message: String },
}
