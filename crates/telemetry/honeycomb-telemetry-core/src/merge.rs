//! State merge engine: folds a frame's partial state onto the accumulated state.
//!
//! Default rules:
//! - scalars, text, buffers and lists overwrite (lists/buffers are replaced wholesale, never diffed)
//! - nested records merge key by key, keeping keys the incoming record does not mention
//! - `Null` removes the key
//!
//! A [`MergeStrategy`] registered for a field path replaces the default for that field.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::MergeError;
use honeycomb_api_core::{FieldPath, StateRecord, StateValue};

/// Per-field merge override supplied by the caller.
pub trait CustomMerge: Send + Sync {
    /// Merge `incoming` for `key` into `target`, the record that contains the key.
    /// The override owns the mutation; `ctx.default_merge` applies the built-in rules.
    fn merge(
        &self,
        ctx: &MergeContext<'_>,
        key: &str,
        incoming: &StateValue,
        target: &mut StateRecord,
    ) -> Result<(), MergeError>;
}

impl<F> CustomMerge for F
where
    F: Fn(&MergeContext<'_>, &str, &StateValue, &mut StateRecord) -> Result<(), MergeError>
        + Send
        + Sync,
{
    fn merge(
        &self,
        ctx: &MergeContext<'_>,
        key: &str,
        incoming: &StateValue,
        target: &mut StateRecord,
    ) -> Result<(), MergeError> {
        self(ctx, key, incoming, target)
    }
}

#[derive(Clone)]
pub enum MergeStrategy {
    /// Built-in rules.
    Default,
    /// Replace the field wholesale, records included.
    Replace,
    /// ROS visualization marker lists with add/delete actions.
    Markers(MarkerMerge),
    Custom(Arc<dyn CustomMerge>),
}

impl MergeStrategy {
    /// Wrap a closure as a custom strategy.
    pub fn custom<F>(merge: F) -> Self
    where
        F: Fn(&MergeContext<'_>, &str, &StateValue, &mut StateRecord) -> Result<(), MergeError>
            + Send
            + Sync
            + 'static,
    {
        MergeStrategy::Custom(Arc::new(merge))
    }
}

impl fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::Default => f.write_str("Default"),
            MergeStrategy::Replace => f.write_str("Replace"),
            MergeStrategy::Markers(m) => f.debug_tuple("Markers").field(m).finish(),
            MergeStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Marker actions, matching `visualization_msgs/Marker`.
pub const MARKER_ADD: i64 = 0;
pub const MARKER_MODIFY: i64 = 1;
pub const MARKER_DELETE: i64 = 2;
pub const MARKER_DELETE_ALL: i64 = 3;

/// Upsert/delete semantics for lists of marker records keyed by id fields.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerMerge {
    pub id_fields: Vec<String>,
    pub action_field: String,
}

impl Default for MarkerMerge {
    fn default() -> Self {
        Self {
            id_fields: vec!["ns".into(), "id".into()],
            action_field: "action".into(),
        }
    }
}

impl MarkerMerge {
    fn same_marker(&self, a: &StateRecord, b: &StateRecord) -> bool {
        self.id_fields.iter().all(|f| a.get(f) == b.get(f))
    }

    fn apply(
        &self,
        path: &str,
        incoming: &StateValue,
        target: &mut StateRecord,
        key: &str,
    ) -> Result<(), MergeError> {
        let items = match incoming {
            StateValue::Null => {
                target.remove(key);
                return Ok(());
            }
            StateValue::List(items) => items,
            other => {
                return Err(MergeError::UnexpectedKind {
                    path: path.to_string(),
                    expected: "list of markers",
                    found: format!("{:?}", other.kind()),
                })
            }
        };

        let mut markers: Vec<StateValue> = match target.remove(key) {
            Some(StateValue::List(existing)) => existing.to_vec(),
            _ => Vec::new(),
        };

        for item in items.iter() {
            let marker = item.as_record().ok_or_else(|| MergeError::UnexpectedKind {
                path: path.to_string(),
                expected: "marker record",
                found: format!("{:?}", item.kind()),
            })?;
            let action = marker.number(&self.action_field).unwrap_or(MARKER_ADD as f64) as i64;
            match action {
                MARKER_ADD | MARKER_MODIFY => {
                    let existing = markers.iter_mut().find(|m| {
                        m.as_record()
                            .map(|r| self.same_marker(r, marker))
                            .unwrap_or(false)
                    });
                    match existing {
                        Some(slot) => *slot = item.clone(),
                        None => markers.push(item.clone()),
                    }
                }
                MARKER_DELETE => markers.retain(|m| {
                    !m.as_record()
                        .map(|r| self.same_marker(r, marker))
                        .unwrap_or(false)
                }),
                MARKER_DELETE_ALL => markers.clear(),
                other => {
                    return Err(MergeError::Failed {
                        path: path.to_string(),
                        reason: format!("unknown marker action {other}"),
                    })
                }
            }
        }

        target.insert(key, StateValue::list(markers));
        Ok(())
    }
}

/// Handed to custom merges so they can fall back to the built-in rules.
pub struct MergeContext<'a> {
    merger: &'a StateMerger,
    prefix: &'a str,
}

impl MergeContext<'_> {
    /// Full dotted path of `key` within the accumulated state.
    pub fn path(&self, key: &str) -> String {
        join(self.prefix, key)
    }

    /// Apply the default rules for `key`. Nested fields still honour registered strategies.
    pub fn default_merge(
        &self,
        key: &str,
        incoming: &StateValue,
        target: &mut StateRecord,
    ) -> Result<(), MergeError> {
        let path = join(self.prefix, key);
        self.merger.default_merge_key(target, key, incoming, &path)
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Merge engine with its per-field strategy table (the merge map).
#[derive(Clone, Debug, Default)]
pub struct StateMerger {
    strategies: HashMap<String, MergeStrategy>,
}

impl StateMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy for a field path (builder style).
    pub fn with_strategy(mut self, path: FieldPath, strategy: MergeStrategy) -> Self {
        self.insert(path, strategy);
        self
    }

    pub fn insert(&mut self, path: FieldPath, strategy: MergeStrategy) {
        self.strategies.insert(path.to_string(), strategy);
    }

    pub fn strategy(&self, path: &str) -> Option<&MergeStrategy> {
        self.strategies.get(path)
    }

    /// Fold `incoming` onto `target` in place.
    pub fn merge(&self, target: &mut StateRecord, incoming: &StateRecord) -> Result<(), MergeError> {
        self.merge_record(target, incoming, "")
    }

    fn merge_record(
        &self,
        target: &mut StateRecord,
        incoming: &StateRecord,
        prefix: &str,
    ) -> Result<(), MergeError> {
        for (key, value) in incoming.iter() {
            self.merge_key(target, key, value, prefix)?;
        }
        Ok(())
    }

    fn merge_key(
        &self,
        target: &mut StateRecord,
        key: &str,
        value: &StateValue,
        prefix: &str,
    ) -> Result<(), MergeError> {
        if self.strategies.is_empty() {
            return self.default_merge_key(target, key, value, "");
        }
        let path = join(prefix, key);
        match self.strategies.get(&path) {
            None | Some(MergeStrategy::Default) => self.default_merge_key(target, key, value, &path),
            Some(MergeStrategy::Replace) => {
                if value.is_null() {
                    target.remove(key);
                } else {
                    target.insert(key, value.clone());
                }
                Ok(())
            }
            Some(MergeStrategy::Markers(markers)) => markers.apply(&path, value, target, key),
            Some(MergeStrategy::Custom(custom)) => {
                let ctx = MergeContext {
                    merger: self,
                    prefix,
                };
                custom.merge(&ctx, key, value, target)
            }
        }
    }

    fn default_merge_key(
        &self,
        target: &mut StateRecord,
        key: &str,
        value: &StateValue,
        path: &str,
    ) -> Result<(), MergeError> {
        match value {
            StateValue::Null => {
                target.remove(key);
            }
            StateValue::Record(incoming) => {
                let nested = target.record_entry(key);
                self.merge_record(nested, incoming, path)?;
            }
            other => {
                target.insert(key, other.clone());
            }
        }
        Ok(())
    }
}
