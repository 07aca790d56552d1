use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::error::TagError;
use crate::expr::{validate_tag, TagExpression};

/// Tags attached to objects, queried with [`TagExpression`]s.
///
/// Objects are reported in the order they were first tagged.
#[derive(Clone, Debug)]
pub struct TagTracker<K> {
    objects: IndexMap<K, IndexSet<String>>,
}

impl<K> Default for TagTracker<K> {
    fn default() -> Self {
        Self {
            objects: IndexMap::new(),
        }
    }
}

impl<K: Clone + Eq + Hash> TagTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Attach `tags` to `object`. Nothing is attached if any tag is invalid.
    pub fn add_tag<I, S>(&mut self, object: K, tags: I) -> Result<(), TagError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<S> = tags.into_iter().collect();
        for tag in &tags {
            validate_tag(tag.as_ref())?;
        }
        let entry = self.objects.entry(object).or_default();
        for tag in tags {
            entry.insert(tag.as_ref().to_string());
        }
        Ok(())
    }

    /// Detach `tags` from `object`; an object left without tags is forgotten.
    /// Returns whether any tag was removed.
    pub fn remove_tag<I, S>(&mut self, object: &K, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(entry) = self.objects.get_mut(object) else {
            return false;
        };
        let mut removed = false;
        for tag in tags {
            removed |= entry.shift_remove(tag.as_ref());
        }
        if entry.is_empty() {
            self.objects.shift_remove(object);
        }
        removed
    }

    pub fn remove_object(&mut self, object: &K) -> bool {
        self.objects.shift_remove(object).is_some()
    }

    pub fn tags_of(&self, object: &K) -> Vec<&str> {
        self.objects
            .get(object)
            .map(|tags| tags.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether `object` satisfies the tag expression `expr`.
    pub fn has_tags(&self, object: &K, expr: &str) -> Result<bool, TagError> {
        let expr = TagExpression::parse(expr)?;
        Ok(self.matches(object, &expr))
    }

    pub fn matches(&self, object: &K, expr: &TagExpression) -> bool {
        let tags = self.objects.get(object);
        expr.matches(&|tag: &str| tags.is_some_and(|tags| tags.contains(tag)))
    }

    /// Objects satisfying the tag expression `expr`.
    pub fn get_objects(&self, expr: &str) -> Result<Vec<K>, TagError> {
        let expr = TagExpression::parse(expr)?;
        let found = self.query(&expr);
        debug!("tag query '{expr}' matched {} objects", found.len());
        Ok(found)
    }

    pub fn query(&self, expr: &TagExpression) -> Vec<K> {
        self.objects
            .iter()
            .filter(|(_, tags)| expr.matches(&|tag: &str| tags.contains(tag)))
            .map(|(object, _)| object.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TagTracker<&'static str> {
        let mut tracker = TagTracker::new();
        tracker.add_tag("rover", ["interactive", "visible"]).unwrap();
        tracker.add_tag("mast", ["visible"]).unwrap();
        tracker.add_tag("hazard_1", ["visible", "hazard"]).unwrap();
        tracker.add_tag("debug_axes", ["debug"]).unwrap();
        tracker
    }

    #[test]
    fn queries_follow_boolean_logic() {
        let tracker = tracker();
        assert_eq!(tracker.get_objects("visible").unwrap(), vec!["rover", "mast", "hazard_1"]);
        assert_eq!(
            tracker.get_objects("visible && !hazard").unwrap(),
            vec!["rover", "mast"]
        );
        assert_eq!(
            tracker.get_objects("interactive || debug").unwrap(),
            vec!["rover", "debug_axes"]
        );
        assert_eq!(
            tracker.get_objects("!(visible || debug)").unwrap(),
            Vec::<&str>::new()
        );
        assert!(tracker.has_tags(&"hazard_1", "hazard && visible").unwrap());
        assert!(!tracker.has_tags(&"unknown", "visible").unwrap());
        assert!(tracker.has_tags(&"unknown", "!visible").unwrap());
    }

    #[test]
    fn invalid_tags_are_rejected_atomically() {
        let mut tracker = tracker();
        let err = tracker.add_tag("mast", ["selected", "a||b"]).unwrap_err();
        assert!(matches!(err, TagError::InvalidTag { .. }));
        assert_eq!(tracker.tags_of(&"mast"), vec!["visible"]);
        assert!(tracker.add_tag("arm", ["has space"]).is_err());
        assert!(tracker.tags_of(&"arm").is_empty());
    }

    #[test]
    fn removing_tags_and_objects() {
        let mut tracker = tracker();
        assert!(tracker.remove_tag(&"rover", ["interactive"]));
        assert!(!tracker.remove_tag(&"rover", ["interactive"]));
        assert_eq!(tracker.tags_of(&"rover"), vec!["visible"]);

        assert!(tracker.remove_tag(&"debug_axes", ["debug"]));
        assert!(tracker.get_objects("debug").unwrap().is_empty());
        assert_eq!(tracker.len(), 3);

        assert!(tracker.remove_object(&"mast"));
        assert!(!tracker.remove_object(&"mast"));
        assert_eq!(tracker.get_objects("visible").unwrap(), vec!["rover", "hazard_1"]);
    }

    #[test]
    fn bad_queries_are_errors() {
        let tracker = tracker();
        assert!(matches!(
            tracker.get_objects("visible &&"),
            Err(TagError::Syntax { .. })
        ));
    }
}
