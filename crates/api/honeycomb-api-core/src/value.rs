//! StateValue and StateRecord: the sparse, nested telemetry state model.
//! Numbers are f64 throughout; telemetry timestamps and joint angles need the precision.

use hashbrown::HashMap;
use std::sync::Arc;

use crate::path::FieldPath;

/// Coarse kind of a [`StateValue`], handy for dispatch and error messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    Text,
    Buffer,
    Bytes,
    List,
    Record,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateValue {
    /// Explicit clear marker; merging it removes the key.
    Null,

    Bool(bool),

    Number(f64),

    /// Text; never interpolated
    Text(String),

    /// Fixed-size numeric array (point clouds, grids). Replaced wholesale on merge.
    Buffer(Arc<[f64]>),

    /// Loaded out-of-band payload (image file contents, binary grids).
    Bytes(Arc<[u8]>),

    /// Ordered list of values, shared between clones. Replaced wholesale on merge unless a
    /// merge strategy says otherwise.
    List(Arc<[StateValue]>),

    /// Nested record
    Record(StateRecord),
}

impl StateValue {
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            StateValue::Null => ValueKind::Null,
            StateValue::Bool(_) => ValueKind::Bool,
            StateValue::Number(_) => ValueKind::Number,
            StateValue::Text(_) => ValueKind::Text,
            StateValue::Buffer(_) => ValueKind::Buffer,
            StateValue::Bytes(_) => ValueKind::Bytes,
            StateValue::List(_) => ValueKind::List,
            StateValue::Record(_) => ValueKind::Record,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_record(&self) -> Option<&StateRecord> {
        match self {
            StateValue::Record(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_record_mut(&mut self) -> Option<&mut StateRecord> {
        match self {
            StateValue::Record(r) => Some(r),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::List(l) => Some(l.as_ref()),
            _ => None,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    /// Convenience constructors
    pub fn number(v: f64) -> Self {
        StateValue::Number(v)
    }

    pub fn text(s: impl Into<String>) -> Self {
        StateValue::Text(s.into())
    }

    pub fn buffer(values: impl Into<Arc<[f64]>>) -> Self {
        StateValue::Buffer(values.into())
    }

    pub fn list(items: impl Into<Arc<[StateValue]>>) -> Self {
        StateValue::List(items.into())
    }

    /// Both values point at the same shared list, buffer or payload.
    pub fn shares_storage(&self, other: &StateValue) -> bool {
        match (self, other) {
            (StateValue::List(a), StateValue::List(b)) => Arc::ptr_eq(a, b),
            (StateValue::Buffer(a), StateValue::Buffer(b)) => Arc::ptr_eq(a, b),
            (StateValue::Bytes(a), StateValue::Bytes(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        StateValue::Number(v)
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        StateValue::Bool(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        StateValue::Text(v.to_string())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        StateValue::Text(v)
    }
}

impl From<StateRecord> for StateValue {
    fn from(v: StateRecord) -> Self {
        StateValue::Record(v)
    }
}

/// Field name → value map. Presence is sparse: a frame only carries what changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateRecord {
    fields: HashMap<String, StateValue>,
}

impl StateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            fields: HashMap::with_capacity(cap),
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.fields.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut StateValue> {
        self.fields.get_mut(key)
    }

    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Option<StateValue> {
        self.fields.insert(key.into(), value.into())
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<StateValue> {
        self.fields.remove(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut StateValue)> {
        self.fields.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Number stored directly under `key`.
    #[inline]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(StateValue::as_f64)
    }

    /// Nested record under `key`, replacing any non-record value with an empty record.
    pub fn record_entry(&mut self, key: &str) -> &mut StateRecord {
        let slot = self
            .fields
            .entry(key.to_string())
            .or_insert_with(|| StateValue::Record(StateRecord::new()));
        if !matches!(slot, StateValue::Record(_)) {
            *slot = StateValue::Record(StateRecord::new());
        }
        match slot {
            StateValue::Record(r) => r,
            _ => unreachable!("slot was just set to a record"),
        }
    }

    /// Resolve a nested path.
    pub fn get_path(&self, path: &FieldPath) -> Option<&StateValue> {
        let mut segments = path.segments();
        let first = segments.next()?;
        let mut current = self.get(first)?;
        for seg in segments {
            current = current.as_record()?.get(seg)?;
        }
        Some(current)
    }

    pub fn get_path_mut(&mut self, path: &FieldPath) -> Option<&mut StateValue> {
        let mut segments = path.segments();
        let first = segments.next()?;
        let mut current = self.get_mut(first)?;
        for seg in segments {
            current = current.as_record_mut()?.get_mut(seg)?;
        }
        Some(current)
    }

    /// Write a value at a nested path, creating intermediate records as needed.
    pub fn set_path(&mut self, path: &FieldPath, value: StateValue) {
        let Some(parent) = path.parent() else {
            self.insert(path.leaf(), value);
            return;
        };
        let mut record = &mut *self;
        for seg in parent.segments() {
            record = record.record_entry(seg);
        }
        record.insert(path.leaf(), value);
    }

    /// Remove the value at a nested path. Intermediate records are left in place.
    pub fn remove_path(&mut self, path: &FieldPath) -> Option<StateValue> {
        match path.parent() {
            None => self.remove(path.leaf()),
            Some(parent) => self
                .get_path_mut(&parent)?
                .as_record_mut()?
                .remove(path.leaf()),
        }
    }
}

impl<K: Into<String>, V: Into<StateValue>> FromIterator<(K, V)> for StateRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
