//! Engine errors
//!
//! Only `InvalidParameter` and `ProtocolViolation` ever reach a caller;
//! singularities and device failures are handled where they occur and
//! degrade to flagged results.

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter `{field}`: {message}")]
    InvalidParameter {
        field: &'static str,
        message: String,
    },

    #[error("numeric singularity in {context}: {message}")]
    NumericSingularity {
        context: &'static str,
        message: String,
    },

    #[error("device failure: {0}")]
    DeviceFailure(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl Error {
    /// Shorthand for a rejected request field.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            field,
            message: message.into(),
        }
    }
}
