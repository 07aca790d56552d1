//! Honeycomb Tags Core
//!
//! Associates string tags with arbitrary objects and answers boolean tag queries such as
//! `interactive && !(hidden || debug)`.

pub mod error;
pub mod expr;
pub mod tracker;

pub use error::TagError;
pub use expr::{validate_tag, TagExpression};
pub use tracker::TagTracker;
