//! Playback/seek core.
//!
//! [`TelemetryAnimator`] owns a cursor into a shared [`FrameStore`]. Forward playback merges
//! frames one at a time; rewinds and long jumps binary-search the store and replay merges from
//! the start. After the cursor settles the merged state is optionally interpolated toward the
//! next frame and diffed against the previous output.

use std::sync::Arc;

use log::debug;

use crate::config::AnimatorConfig;
use crate::error::{AnimatorError, MergeError};
use crate::frames::FrameStore;
use crate::interp::InterpolationStrategy;
use crate::merge::StateMerger;
use honeycomb_api_core::{diff_records, ChangeSet, StateRecord};

/// Playback contract shared by the core animator and its decorators.
pub trait Animator {
    /// Move playback to `t`. Synchronous; never waits on I/O.
    fn set_time(&mut self, t: f64) -> Result<(), AnimatorError>;

    /// Current output state. Read-only for consumers and only valid until the next `set_time`.
    fn state(&self) -> &StateRecord;

    /// Paths changed by the most recent `set_time`.
    fn changes(&self) -> &ChangeSet;

    fn did_change(&self, path: &str) -> bool {
        self.changes().did_change(path)
    }

    /// Time of the last successful `set_time`, `None` before the first one or after `reset`.
    fn time(&self) -> Option<f64>;

    fn frames(&self) -> &FrameStore;

    /// Drop all accumulated state and return to the unset state.
    fn reset(&mut self);
}

/// Merged state for the frames following the cursor, cached until the cursor moves.
#[derive(Debug)]
struct NextState {
    cursor: usize,
    time: f64,
    state: StateRecord,
}

#[derive(Debug)]
pub struct TelemetryAnimator {
    store: Arc<FrameStore>,
    config: AnimatorConfig,
    merger: StateMerger,
    interpolation: InterpolationStrategy,
    time: Option<f64>,
    /// Number of frames folded into `merged`.
    cursor: usize,
    merged: StateRecord,
    next: Option<NextState>,
    output: StateRecord,
    interpolated: bool,
    /// `output` lags `merged` after a failed interpolation.
    stale: bool,
    changes: ChangeSet,
    poisoned: bool,
}

impl TelemetryAnimator {
    pub fn new(store: Arc<FrameStore>, config: AnimatorConfig) -> Self {
        Self {
            store,
            config,
            merger: StateMerger::new(),
            interpolation: InterpolationStrategy::default(),
            time: None,
            cursor: 0,
            merged: StateRecord::new(),
            next: None,
            output: StateRecord::new(),
            interpolated: false,
            stale: false,
            changes: ChangeSet::new(),
            poisoned: false,
        }
    }

    /// Replace the merge engine (and its merge map).
    pub fn with_merge_map(mut self, merger: StateMerger) -> Self {
        self.merger = merger;
        self.reset();
        self
    }

    pub fn with_interpolation(mut self, strategy: InterpolationStrategy) -> Self {
        self.interpolation = strategy;
        self.reset();
        self
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    pub fn merger(&self) -> &StateMerger {
        &self.merger
    }

    /// Number of frames currently folded into the merged state.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the current output was produced by interpolation.
    pub fn is_interpolated(&self) -> bool {
        self.interpolated
    }

    /// Frame count the cursor must reach for time `t`.
    fn target_for(&self, t: f64) -> usize {
        let target = self.store.count_at_or_before(t);
        // before the first frame a backfilled store still yields its synthesized state
        if target == 0 && self.store.is_backfilled() {
            1
        } else {
            target
        }
    }

    fn poison<T>(&mut self, err: MergeError) -> Result<T, AnimatorError> {
        self.poisoned = true;
        Err(AnimatorError::Merge(err))
    }

    /// Move the merge cursor to `target`. Returns whether the merged state was touched.
    fn seek(&mut self, target: usize) -> Result<bool, MergeError> {
        if target == self.cursor {
            return Ok(false);
        }
        if !self.config.continuous {
            self.merge_group(target)?;
            return Ok(true);
        }

        let frames = self.store.frames();
        let forward = target > self.cursor && target - self.cursor <= self.config.max_forward_scan;
        let start = if forward {
            self.cursor
        } else {
            debug!(
                "rebuilding state: cursor {} -> {} of {} frames",
                self.cursor,
                target,
                frames.len()
            );
            self.merged.clear();
            0
        };
        self.cursor = start;
        for frame in &frames[start..target] {
            self.merger.merge(&mut self.merged, &frame.state)?;
            self.cursor += 1;
        }
        Ok(true)
    }

    /// Non-continuous mode: state holds only the frames sharing the timestamp of `target - 1`.
    fn merge_group(&mut self, target: usize) -> Result<(), MergeError> {
        self.merged.clear();
        self.cursor = target;
        let Some(last) = target.checked_sub(1).and_then(|i| self.store.get(i)) else {
            return Ok(());
        };
        let start = self.store.count_before(last.time);
        for frame in &self.store.frames()[start..target] {
            self.merger.merge(&mut self.merged, &frame.state)?;
        }
        Ok(())
    }

    /// Fully merged state at the first frame time after the cursor, if interpolation applies at `t`.
    fn next_state(&mut self, t: f64) -> Result<Option<(f64, f64)>, MergeError> {
        if !self.config.interpolate || self.cursor == 0 || self.cursor >= self.store.len() {
            return Ok(None);
        }
        let frames = self.store.frames();
        let curr_time = frames[self.cursor - 1].time;
        if t <= curr_time {
            return Ok(None);
        }

        if self.next.as_ref().map(|n| n.cursor) != Some(self.cursor) {
            let next_time = frames[self.cursor].time;
            let end = self.store.count_at_or_before(next_time);
            let mut state = if self.config.continuous {
                self.merged.clone()
            } else {
                StateRecord::new()
            };
            for frame in &frames[self.cursor..end] {
                self.merger.merge(&mut state, &frame.state)?;
            }
            self.next = Some(NextState {
                cursor: self.cursor,
                time: next_time,
                state,
            });
        }
        Ok(self.next.as_ref().map(|n| (curr_time, n.time)))
    }
}

impl Animator for TelemetryAnimator {
    fn set_time(&mut self, t: f64) -> Result<(), AnimatorError> {
        if self.poisoned {
            return Err(AnimatorError::Poisoned);
        }
        if !t.is_finite() {
            return Err(AnimatorError::InvalidTime(t));
        }
        if self.store.is_empty() {
            return Err(AnimatorError::EmptyStore);
        }
        if self.time == Some(t) {
            self.changes.clear();
            return Ok(());
        }

        let target = self.target_for(t);
        let merged_any = match self.seek(target) {
            Ok(touched) => touched,
            Err(err) => return self.poison(err),
        };
        let bracket = match self.next_state(t) {
            Ok(bracket) => bracket,
            Err(err) => return self.poison(err),
        };

        if !merged_any && bracket.is_none() && !self.interpolated && !self.stale {
            self.time = Some(t);
            self.changes.clear();
            return Ok(());
        }

        let mut output = self.merged.clone();
        if let (Some((curr_time, next_time)), Some(next)) = (bracket, self.next.as_ref()) {
            let ratio = (t - curr_time) / (next_time - curr_time);
            let interpolated = self.interpolation.interpolate(
                &self.config.rotation_maps,
                &self.merged,
                &next.state,
                ratio,
                &mut output,
            );
            if let Err(err) = interpolated {
                // time stays uncommitted so a retry at `t` recomputes
                self.stale = true;
                self.changes.clear();
                return Err(err);
            }
        }

        self.changes.clear();
        diff_records(&self.output, &output, &mut self.changes);
        self.output = output;
        self.interpolated = bracket.is_some();
        self.stale = false;
        self.time = Some(t);
        Ok(())
    }

    fn state(&self) -> &StateRecord {
        &self.output
    }

    fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    fn time(&self) -> Option<f64> {
        self.time
    }

    fn frames(&self) -> &FrameStore {
        &self.store
    }

    /// Also clears a poisoned animator.
    fn reset(&mut self) {
        self.time = None;
        self.cursor = 0;
        self.merged.clear();
        self.next = None;
        self.output.clear();
        self.interpolated = false;
        self.stale = false;
        self.changes.clear();
        self.poisoned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Frame;
    use crate::interp::{Interpolator, RotationMap};
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::merge::MergeStrategy;
    use honeycomb_api_core::{FieldPath, StateValue};
    use serde_json::json;

    fn rec(v: serde_json::Value) -> StateRecord {
        StateRecord::from_json(v).unwrap()
    }

    fn store(frames: Vec<(f64, serde_json::Value)>) -> Arc<FrameStore> {
        let frames = frames
            .into_iter()
            .map(|(t, v)| Frame::new(t, rec(v)))
            .collect();
        Arc::new(FrameStore::new(frames).unwrap())
    }

    fn sample() -> Arc<FrameStore> {
        store(vec![
            (0.0, json!({ "a": 0.0, "name": "start" })),
            (10.0, json!({ "a": 10.0, "b": 1.0 })),
            (20.0, json!({ "a": 20.0, "name": "end" })),
        ])
    }

    #[test]
    fn at_frame_times_state_is_merged_not_interpolated() {
        let mut anim = TelemetryAnimator::new(sample(), AnimatorConfig::default());
        anim.set_time(10.0).unwrap();
        assert_eq!(anim.state(), &rec(json!({ "a": 10.0, "b": 1.0, "name": "start" })));
        assert!(!anim.is_interpolated());
        assert_eq!(anim.cursor(), 2);
    }

    #[test]
    fn between_frames_interpolates_numbers() {
        let mut anim = TelemetryAnimator::new(sample(), AnimatorConfig::default());
        anim.set_time(15.0).unwrap();
        assert_eq!(anim.state().number("a"), Some(15.0));
        assert_eq!(anim.state().get("name"), Some(&StateValue::text("start")));
        assert!(anim.is_interpolated());
        assert!(anim.did_change("a"));

        let cfg = AnimatorConfig {
            interpolate: false,
            ..AnimatorConfig::default()
        };
        let mut stepped = TelemetryAnimator::new(sample(), cfg);
        stepped.set_time(15.0).unwrap();
        assert_eq!(stepped.state().number("a"), Some(10.0));
    }

    #[test]
    fn out_of_range_clamps_to_edges() {
        let mut anim = TelemetryAnimator::new(sample(), AnimatorConfig::default());
        anim.set_time(-5.0).unwrap();
        assert!(anim.state().is_empty());
        anim.set_time(100.0).unwrap();
        assert_eq!(anim.state(), &rec(json!({ "a": 20.0, "b": 1.0, "name": "end" })));
        assert!(!anim.is_interpolated());
    }

    #[test]
    fn rewind_rebuilds_state() {
        let mut anim = TelemetryAnimator::new(sample(), AnimatorConfig::default());
        anim.set_time(20.0).unwrap();
        anim.set_time(0.0).unwrap();
        assert_eq!(anim.state(), &rec(json!({ "a": 0.0, "name": "start" })));
        assert!(anim.did_change("b"));
        assert!(anim.did_change("name"));
    }

    #[test]
    fn repeated_time_reports_no_changes() {
        let mut anim = TelemetryAnimator::new(sample(), AnimatorConfig::default());
        anim.set_time(12.0).unwrap();
        assert!(!anim.changes().is_empty());
        anim.set_time(12.0).unwrap();
        assert!(anim.changes().is_empty());
        assert!(!anim.did_change("a"));
    }

    #[test]
    fn step_within_frame_interval_after_interpolation_settles() {
        let cfg = AnimatorConfig {
            interpolate: false,
            ..AnimatorConfig::default()
        };
        let mut anim = TelemetryAnimator::new(sample(), cfg);
        anim.set_time(11.0).unwrap();
        anim.set_time(12.0).unwrap();
        assert!(anim.changes().is_empty());
    }

    #[test]
    fn non_continuous_only_keeps_cursor_frames() {
        let frames = store(vec![
            (0.0, json!({ "a": 1.0 })),
            (5.0, json!({ "b": 2.0 })),
            (5.0, json!({ "c": 3.0 })),
        ]);
        let cfg = AnimatorConfig {
            continuous: false,
            interpolate: false,
            ..AnimatorConfig::default()
        };
        let mut anim = TelemetryAnimator::new(frames, cfg);
        anim.set_time(6.0).unwrap();
        assert_eq!(anim.state(), &rec(json!({ "b": 2.0, "c": 3.0 })));
        anim.set_time(1.0).unwrap();
        assert_eq!(anim.state(), &rec(json!({ "a": 1.0 })));
    }

    #[test]
    fn rotation_maps_from_config_are_slerped() {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let frames = store(vec![
            (0.0, json!({ "qx": 0.0, "qy": 0.0, "qz": 0.0, "qw": 1.0 })),
            (1.0, json!({ "qz": half, "qw": half })),
        ]);
        let cfg = AnimatorConfig {
            rotation_maps: vec![RotationMap::new("qx", "qy", "qz", "qw")],
            ..AnimatorConfig::default()
        };
        let mut anim = TelemetryAnimator::new(frames, cfg);
        anim.set_time(0.5).unwrap();
        let qz = anim.state().number("qz").unwrap();
        assert!((qz - (std::f64::consts::PI / 8.0).sin()).abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_fail_fast() {
        let mut anim = TelemetryAnimator::new(sample(), AnimatorConfig::default());
        assert!(matches!(
            anim.set_time(f64::NAN),
            Err(AnimatorError::InvalidTime(t)) if t.is_nan()
        ));
        assert_eq!(
            anim.set_time(f64::INFINITY),
            Err(AnimatorError::InvalidTime(f64::INFINITY))
        );
        assert_eq!(anim.time(), None);

        let mut empty =
            TelemetryAnimator::new(Arc::new(FrameStore::default()), AnimatorConfig::default());
        assert_eq!(empty.set_time(0.0), Err(AnimatorError::EmptyStore));
    }

    /// Fails its first call, then interpolates linearly.
    struct FailOnce(AtomicBool);

    impl Interpolator for FailOnce {
        fn interpolate(
            &self,
            curr: &StateRecord,
            next: &StateRecord,
            ratio: f64,
            target: &mut StateRecord,
        ) -> Result<(), String> {
            if !self.0.swap(true, Ordering::SeqCst) {
                return Err("not ready".into());
            }
            if let (Some(a), Some(b)) = (curr.number("a"), next.number("a")) {
                target.insert("a", a + (b - a) * ratio);
            }
            Ok(())
        }
    }

    #[test]
    fn failed_interpolation_is_retried_not_cached() {
        let frames = store(vec![(0.0, json!({ "a": 0.0 })), (1.0, json!({ "a": 1.0 }))]);
        let mut anim = TelemetryAnimator::new(frames, AnimatorConfig::default())
            .with_interpolation(InterpolationStrategy::custom(FailOnce(AtomicBool::new(false))));
        assert_eq!(
            anim.set_time(0.5),
            Err(AnimatorError::Interpolation("not ready".into()))
        );
        assert_eq!(anim.time(), None);
        assert!(anim.changes().is_empty());

        anim.set_time(0.5).unwrap();
        assert_eq!(anim.time(), Some(0.5));
        assert_eq!(anim.state().number("a"), Some(0.5));
        assert!(anim.did_change("a"));
    }

    #[test]
    fn failed_interpolation_does_not_hide_merged_frames() {
        let frames = store(vec![(0.0, json!({ "a": 0.0 })), (1.0, json!({ "a": 1.0 }))]);
        let mut anim = TelemetryAnimator::new(frames, AnimatorConfig::default())
            .with_interpolation(InterpolationStrategy::custom(FailOnce(AtomicBool::new(false))));
        anim.set_time(-1.0).unwrap();
        assert!(anim.set_time(0.5).is_err());
        // frame 0 is already merged; landing exactly on it must still publish it
        anim.set_time(0.0).unwrap();
        assert_eq!(anim.state().number("a"), Some(0.0));
        assert!(anim.did_change("a"));
    }

    #[test]
    fn merge_failure_poisons_until_reset() {
        let merger = StateMerger::new().with_strategy(
            FieldPath::key("bad"),
            MergeStrategy::custom(|ctx, key, _incoming, _target| {
                Err(MergeError::Failed {
                    path: ctx.path(key),
                    reason: "boom".into(),
                })
            }),
        );
        let frames = store(vec![(0.0, json!({ "ok": 1.0 })), (1.0, json!({ "bad": 1.0 }))]);
        let mut anim =
            TelemetryAnimator::new(frames, AnimatorConfig::default()).with_merge_map(merger);
        anim.set_time(0.0).unwrap();
        assert!(matches!(anim.set_time(2.0), Err(AnimatorError::Merge(_))));
        assert_eq!(anim.set_time(0.0), Err(AnimatorError::Poisoned));
        anim.reset();
        anim.set_time(0.0).unwrap();
        assert_eq!(anim.state().number("ok"), Some(1.0));
    }
}
