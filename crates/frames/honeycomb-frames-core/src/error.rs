use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransformError {
    #[error("frame transform is not invertible")]
    Singular,
    #[error("unknown frame '{0}'")]
    UnknownFrame(String),
    #[error("parenting '{frame}' under '{parent}' would create a cycle")]
    Cycle { frame: String, parent: String },
    #[error("invalid transform record for '{frame}': {reason}")]
    InvalidRecord { frame: String, reason: String },
}
