//! Theme engine error types

use thiserror::Error;

/// Template errors
#[derive(Debug, Error)]
pub enum ThemeError {
    /// No template with that name was loaded
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Template parsing or rendering error
    #[error("Template error: {0}")]
    TemplateError(String),

    /// IO error while reading a template directory
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
