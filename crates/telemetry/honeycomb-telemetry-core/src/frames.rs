//! Frame store: the ordered, immutable `{time, state}` sequence behind one animator.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{FrameError, LoadError};
use honeycomb_api_core::{StateRecord, StateValue};

/// A single timestamped partial-state record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub time: f64,
    pub state: StateRecord,
}

impl Frame {
    pub fn new(time: f64, state: StateRecord) -> Self {
        Self { time, state }
    }
}

/// Loader metadata carried alongside frames.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    pub time_format: Option<String>,
    pub source: Option<String>,
}

/// Loader output: frames sorted by time plus metadata.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameSet {
    pub frames: Vec<Frame>,
    pub metadata: FrameMetadata,
}

impl FrameSet {
    pub fn into_store(self) -> Result<FrameStore, FrameError> {
        FrameStore::new(self.frames)
    }
}

/// Time-sorted frames. Never mutated after construction; share it behind an `Arc`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStore {
    frames: Vec<Frame>,
    backfilled: bool,
}

impl FrameStore {
    /// Validate and wrap frames. Times must be finite and non-decreasing.
    pub fn new(frames: Vec<Frame>) -> Result<Self, FrameError> {
        let mut previous = f64::NEG_INFINITY;
        for (index, frame) in frames.iter().enumerate() {
            if !frame.time.is_finite() {
                return Err(FrameError::NonFiniteTime {
                    index,
                    time: frame.time,
                });
            }
            if frame.time < previous {
                return Err(FrameError::Unsorted {
                    index,
                    time: frame.time,
                    previous,
                });
            }
            previous = frame.time;
        }
        Ok(Self {
            frames,
            backfilled: false,
        })
    }

    /// Prepend a frame at the first timestamp holding the last value of every field in the store.
    /// Lets an animator started mid-timeline see a complete state instead of a sparse one.
    pub fn with_backfill(mut self) -> Self {
        if self.backfilled || self.frames.is_empty() {
            return self;
        }
        let mut latest = StateRecord::new();
        for frame in self.frames.iter().rev() {
            fill_missing(&mut latest, &frame.state);
        }
        strip_nulls(&mut latest);
        let first_time = self.frames[0].time;
        debug!(
            "backfill frame at t={first_time} carries {} fields",
            latest.len()
        );
        self.frames.insert(0, Frame::new(first_time, latest));
        self.backfilled = true;
        self
    }

    #[inline]
    pub fn is_backfilled(&self) -> bool {
        self.backfilled
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// First and last frame times.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.frames.first()?.time, self.frames.last()?.time))
    }

    /// Number of frames with `time <= t`.
    #[inline]
    pub fn count_at_or_before(&self, t: f64) -> usize {
        self.frames.partition_point(|f| f.time <= t)
    }

    /// Number of frames with `time < t`.
    #[inline]
    pub fn count_before(&self, t: f64) -> usize {
        self.frames.partition_point(|f| f.time < t)
    }

    /// Index of the last frame with `time <= t`. Equal timestamps resolve to the
    /// latest one in store order, so every tied frame is merged.
    pub fn index_at_or_before(&self, t: f64) -> Option<usize> {
        self.count_at_or_before(t).checked_sub(1)
    }
}

/// First assignment wins: only copy what `acc` has not seen yet.
fn fill_missing(acc: &mut StateRecord, incoming: &StateRecord) {
    for (key, value) in incoming.iter() {
        if !acc.contains_key(key) {
            acc.insert(key, value.clone());
            continue;
        }
        if let (Some(StateValue::Record(a)), StateValue::Record(b)) = (acc.get_mut(key), value) {
            fill_missing(a, b);
        }
    }
}

fn strip_nulls(record: &mut StateRecord) {
    let nulls: Vec<String> = record
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.to_string())
        .collect();
    for key in nulls {
        record.remove(&key);
    }
    for (_, value) in record.iter_mut() {
        if let StateValue::Record(r) = value {
            strip_nulls(r);
        }
    }
}

/// Merge frames from several sources into one time-sorted set.
///
/// Sources must agree on `time_format`. Equal timestamps keep source order, then
/// in-source order.
pub fn merge_frame_sets(sets: Vec<FrameSet>) -> Result<FrameSet, LoadError> {
    let mut time_format: Option<String> = None;
    let mut sources: Vec<String> = Vec::new();
    let mut frames: Vec<Frame> = Vec::with_capacity(sets.iter().map(|s| s.frames.len()).sum());

    for set in sets {
        match (&time_format, &set.metadata.time_format) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(LoadError::MetadataMismatch {
                    field: "timeFormat".into(),
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
            (None, Some(found)) => time_format = Some(found.clone()),
            _ => {}
        }
        if let Some(src) = set.metadata.source {
            sources.push(src);
        }
        frames.extend(set.frames);
    }

    // sort_by is stable, which is what keeps tied frames in source order
    frames.sort_by(|a, b| a.time.total_cmp(&b.time));

    Ok(FrameSet {
        frames,
        metadata: FrameMetadata {
            time_format,
            source: if sources.is_empty() {
                None
            } else {
                Some(sources.join(","))
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(time: f64, pairs: &[(&str, f64)]) -> Frame {
        Frame::new(time, pairs.iter().map(|(k, v)| (*k, *v)).collect())
    }

    #[test]
    fn rejects_unsorted_and_nan() {
        assert!(matches!(
            FrameStore::new(vec![frame(2.0, &[]), frame(1.0, &[])]),
            Err(FrameError::Unsorted { index: 1, .. })
        ));
        assert!(matches!(
            FrameStore::new(vec![frame(f64::NAN, &[])]),
            Err(FrameError::NonFiniteTime { index: 0, .. })
        ));
    }

    #[test]
    fn index_lookup_with_ties() {
        let store = FrameStore::new(vec![
            frame(1.0, &[]),
            frame(2.0, &[]),
            frame(2.0, &[]),
            frame(3.0, &[]),
        ])
        .unwrap();
        assert_eq!(store.index_at_or_before(0.5), None);
        assert_eq!(store.index_at_or_before(1.0), Some(0));
        assert_eq!(store.index_at_or_before(2.0), Some(2));
        assert_eq!(store.index_at_or_before(2.5), Some(2));
        assert_eq!(store.index_at_or_before(10.0), Some(3));
        assert_eq!(store.time_range(), Some((1.0, 3.0)));
    }

    #[test]
    fn backfill_takes_last_value_per_field() {
        let store = FrameStore::new(vec![
            frame(1.0, &[("X", 1.0)]),
            frame(2.0, &[("Y", 2.0), ("X", 5.0)]),
            frame(3.0, &[("Z", 3.0)]),
        ])
        .unwrap()
        .with_backfill();
        assert!(store.is_backfilled());
        assert_eq!(store.len(), 4);
        let first = store.get(0).unwrap();
        assert_eq!(first.time, 1.0);
        assert_eq!(first.state.number("X"), Some(5.0));
        assert_eq!(first.state.number("Y"), Some(2.0));
        assert_eq!(first.state.number("Z"), Some(3.0));
    }

    #[test]
    fn backfill_respects_later_clears() {
        let mut cleared = StateRecord::new();
        cleared.insert("X", StateValue::Null);
        let store = FrameStore::new(vec![frame(1.0, &[("X", 1.0)]), Frame::new(2.0, cleared)])
            .unwrap()
            .with_backfill();
        assert!(!store.get(0).unwrap().state.contains_key("X"));
    }

    #[test]
    fn merge_sets_sorts_and_checks_time_format() {
        let a = FrameSet {
            frames: vec![frame(1.0, &[("a", 1.0)]), frame(3.0, &[("a", 3.0)])],
            metadata: FrameMetadata {
                time_format: Some("ms".into()),
                source: Some("a.json".into()),
            },
        };
        let b = FrameSet {
            frames: vec![frame(1.0, &[("b", 1.0)]), frame(2.0, &[("b", 2.0)])],
            metadata: FrameMetadata {
                time_format: Some("ms".into()),
                source: Some("b.json".into()),
            },
        };
        let merged = merge_frame_sets(vec![a.clone(), b]).unwrap();
        let times: Vec<f64> = merged.frames.iter().map(|f| f.time).collect();
        assert_eq!(times, vec![1.0, 1.0, 2.0, 3.0]);
        assert!(merged.frames[0].state.contains_key("a"));
        assert!(merged.frames[1].state.contains_key("b"));
        assert_eq!(merged.metadata.source.as_deref(), Some("a.json,b.json"));

        let c = FrameSet {
            frames: vec![],
            metadata: FrameMetadata {
                time_format: Some("sclk".into()),
                source: None,
            },
        };
        assert!(matches!(
            merge_frame_sets(vec![a, c]),
            Err(LoadError::MetadataMismatch { .. })
        ));
    }
}
