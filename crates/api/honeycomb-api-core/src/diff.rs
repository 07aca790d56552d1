//! Change tracking between two state records.
//!
//! A [`ChangeSet`] holds every changed path plus all of its ancestors, so a driver can
//! ask about a whole subtree (`"rover"`) or a single leaf (`"rover.joints.ARM_1"`).
//! Paths whose value was swapped wholesale (kind change, list or buffer change, removal)
//! are also kept in a second set so queries below them answer `true` as well.

use hashbrown::HashSet;

use crate::value::{StateRecord, StateValue};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    paths: HashSet<String>,
    replaced: HashSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
        self.replaced.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of distinct changed paths, ancestors included.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Mark `path` (and its ancestors) as changed. Descendant queries answer `true`.
    pub fn mark(&mut self, path: &str) {
        self.replaced.insert(path.to_string());
        self.mark_with_ancestors(path);
    }

    fn mark_with_ancestors(&mut self, path: &str) {
        let mut end = path.len();
        loop {
            let prefix = &path[..end];
            if !self.paths.insert(prefix.to_string()) {
                // ancestors already recorded by an earlier sibling
                break;
            }
            match prefix.rfind('.') {
                Some(dot) => end = dot,
                None => break,
            }
        }
    }

    /// Merge another change set into this one.
    pub fn extend(&mut self, other: &ChangeSet) {
        self.paths.extend(other.paths.iter().cloned());
        self.replaced.extend(other.replaced.iter().cloned());
    }

    pub fn did_change(&self, path: &str) -> bool {
        if self.paths.contains(path) {
            return true;
        }
        let mut rest = path;
        while let Some(dot) = rest.rfind('.') {
            rest = &rest[..dot];
            if self.replaced.contains(rest) {
                return true;
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(|s| s.as_str())
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn diff_into(prev: &StateRecord, next: &StateRecord, prefix: &str, out: &mut ChangeSet) {
    for (key, next_value) in next.iter() {
        let path = join(prefix, key);
        match (prev.get(key), next_value) {
            (None, _) => out.mark(&path),
            (Some(StateValue::Record(a)), StateValue::Record(b)) => diff_into(a, b, &path, out),
            (Some(a), b) => {
                if !a.shares_storage(b) && a != b {
                    out.mark(&path);
                }
            }
        }
    }
    for key in prev.keys() {
        if !next.contains_key(key) {
            out.mark(&join(prefix, key));
        }
    }
}

/// Structural diff of two records, appended to `out`.
pub fn diff_records(prev: &StateRecord, next: &StateRecord, out: &mut ChangeSet) {
    diff_into(prev, next, "", out);
}
