//! Error type for the pure domain layer.
//!
//! Everything core rejects is a validation failure, including stored rows
//! that no longer match their content.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}
