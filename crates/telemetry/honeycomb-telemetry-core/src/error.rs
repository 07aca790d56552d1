//! Error types for telemetry loading, playback and prefetch.

use thiserror::Error;

/// Frame store construction failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("frame {index} has non-finite time {time}")]
    NonFiniteTime { index: usize, time: f64 },

    #[error("frames are not sorted: frame {index} at {time} precedes {previous}")]
    Unsorted { index: usize, time: f64, previous: f64 },
}

/// Loader failures. Loaders never return partially parsed data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("frame {index} is invalid: {reason}")]
    InvalidFrame { index: usize, reason: String },

    #[error("missing required header field '{field}'")]
    MissingHeader { field: String },

    #[error("metadata mismatch for '{field}': '{expected}' vs '{found}'")]
    MetadataMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    Frames(#[from] FrameError),
}

impl LoadError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        LoadError::Parse {
            line,
            reason: reason.into(),
        }
    }
}

/// Raised by merge strategies. Propagates out of `set_time`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("merge of '{path}' failed: {reason}")]
    Failed { path: String, reason: String },

    #[error("field '{path}' expected {expected}, found {found}")]
    UnexpectedKind {
        path: String,
        expected: &'static str,
        found: String,
    },
}

/// Playback core failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimatorError {
    #[error("invalid playback time {0}")]
    InvalidTime(f64),

    #[error("cannot seek an empty frame store")]
    EmptyStore,

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("interpolation failed: {0}")]
    Interpolation(String),

    #[error("animator state is inconsistent after an earlier merge failure")]
    Poisoned,

    #[error(transparent)]
    Prefetch(#[from] PrefetchError),
}

/// Job runner outcomes other than success.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job cancelled")]
    Cancelled,

    #[error("job failed: {0}")]
    Failed(String),
}

/// Lifecycle violations in the payload cache. These indicate a caller bug.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefetchError {
    #[error("payload '{key}' released more times than it was acquired")]
    RefCountUnderflow { key: String },

    #[error("no async runtime available for prefetch: {0}")]
    NoRuntime(String),
}
