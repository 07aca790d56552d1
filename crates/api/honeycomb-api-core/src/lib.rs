//! honeycomb-api-core: state values, field paths and change tracking (engine-agnostic)

pub mod diff;
pub mod json;
pub mod path;
pub mod value;

pub use diff::{diff_records, ChangeSet};
pub use path::{FieldPath, PathError};
pub use value::{StateRecord, StateValue, ValueKind};
