//! Input rejected before it reaches the store

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Empty { field: &'static str },

    /// Longer than the column the value is stored in.
    #[error("{field} is longer than {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} is invalid: {reason}")]
    InvalidFormat { field: &'static str, reason: &'static str },
}
