//! View engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    /// An embedded template failed to parse
    #[error("Invalid template {name}: {reason}")]
    InvalidTemplate { name: String, reason: String },

    /// Embedded file is not valid UTF-8
    #[error("Template {0} is not valid UTF-8")]
    Encoding(String),

    #[error("Failed to render {name}: {reason}")]
    Render { name: String, reason: String },
}
