//! Honeycomb Telemetry Core
//!
//! Time-synchronized playback of sparse telemetry: loaders build immutable frame stores,
//! a [`TelemetryAnimator`] merges and interpolates them into a state for any playback time,
//! and a [`LookaheadAnimator`] prefetches out-of-band payloads around the playhead.

pub mod animator;
pub mod cache;
pub mod config;
pub mod error;
pub mod frames;
pub mod interp;
pub mod jobs;
pub mod loaders;
pub mod lookahead;
pub mod merge;

// Re-exports for drivers and viewers
pub use animator::{Animator, TelemetryAnimator};
pub use cache::{FilePayloadLoader, Payload, PayloadCache, PayloadLoader, PayloadStatus};
pub use config::{AnimatorConfig, FetchOptions, LookaheadConfig, SessionConfig};
pub use error::{AnimatorError, FrameError, JobError, LoadError, MergeError, PrefetchError};
pub use frames::{merge_frame_sets, Frame, FrameMetadata, FrameSet, FrameStore};
pub use interp::{InterpolationStrategy, Interpolator, RotationMap};
pub use jobs::{CancelCallback, JobHandle, JobRunner};
pub use loaders::{CsvChannelLoader, JsonFrameLoader, RksmlLoader, TelemetryLoader};
pub use lookahead::{LookaheadAnimator, PayloadBinding};
pub use merge::{CustomMerge, MarkerMerge, MergeContext, MergeStrategy, StateMerger};
pub use honeycomb_api_core::{ChangeSet, FieldPath, StateRecord, StateValue};
