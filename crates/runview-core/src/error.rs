//! Error types and result aliases shared across runview crates.

/// The result type used throughout runview-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in runview-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// An invalid log level label was provided.
    #[error("invalid log level: {label}")]
    InvalidLevel {
        /// The label that failed to parse.
        label: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_id_display() {
        let err = Error::InvalidId {
            message: "not a ULID".into(),
        };
        assert!(err.to_string().contains("invalid identifier"));
    }

    #[test]
    fn invalid_level_display() {
        let err = Error::InvalidLevel {
            label: "SHOUTING".into(),
        };
        assert!(err.to_string().contains("SHOUTING"));
    }
}
