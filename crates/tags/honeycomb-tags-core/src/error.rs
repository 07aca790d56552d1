use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: String },
    #[error("syntax error in '{expr}' at {position}: {message}")]
    Syntax {
        expr: String,
        position: usize,
        message: String,
    },
}
