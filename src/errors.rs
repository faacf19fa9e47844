/// Domain-specific error types for matjip
///
/// Only request validation, configuration and the request deadline surface to callers.
/// Store and embedder failures are absorbed at the channel boundary and never abort a search.

#[derive(Debug, thiserror::Error)]
pub enum MatjipError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Search timed out after {0} seconds")]
    Timeout(u64),
}

impl MatjipError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use matjip::errors::MatjipError;
    /// let err = MatjipError::validation("intent", "Intent cannot be empty");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        MatjipError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }
}
