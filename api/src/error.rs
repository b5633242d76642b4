use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MotherlodeError {
    #[error("{what}: expected at least {expected} values, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field}: not an unsigned integer: {value}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("{field}: not a boolean: {value}")]
    InvalidBool { field: &'static str, value: String },

    #[error("{what}: {reason}")]
    InvariantViolated { what: &'static str, reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid block number {0}, expected 1..=25")]
    InvalidBlock(u64),

    #[error("invalid automation strategy: {0}")]
    InvalidStrategy(String),
}
