//! Honeycomb Frames Core
//!
//! Expresses points, directions, orientations and poses given in one coordinate frame
//! in another, and tracks a tree of named frames updated from telemetry state.

pub mod error;
pub mod transform;
pub mod tree;

pub use error::TransformError;
pub use transform::{
    pose_matrix, relative_matrix, rotation_of, transform_direction, transform_frame,
    transform_point, transform_quaternion, FrameTransformer,
};
pub use tree::FrameTree;
