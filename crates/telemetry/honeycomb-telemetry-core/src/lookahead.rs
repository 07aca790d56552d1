//! Lookahead prefetch decorator.
//!
//! Wraps any [`Animator`] and keeps payloads referenced by frames near the playhead loaded.
//! Every frame inside `[t - look_back, t + look_ahead]` (plus the frame under the cursor)
//! holds one reference on each payload it names. Completed loads are picked up on the next
//! `set_time` and spliced into the output state as [`StateValue::Bytes`]. The synthesized
//! frame of a backfilled store never holds references.

use std::ops::Range;
use std::sync::Arc;

use hashbrown::HashMap;
use log::error;
use serde::{Deserialize, Serialize};

use crate::animator::Animator;
use crate::cache::{PayloadCache, PayloadLoader};
use crate::config::{FetchOptions, LookaheadConfig};
use crate::error::{AnimatorError, PrefetchError};
use crate::frames::FrameStore;
use crate::jobs::JobRunner;
use honeycomb_api_core::{ChangeSet, FieldPath, StateRecord, StateValue};

/// Where a payload reference lives in the state and where its loaded bytes go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadBinding {
    pub reference: FieldPath,
    pub output: FieldPath,
}

impl PayloadBinding {
    pub fn new(reference: FieldPath, output: FieldPath) -> Self {
        Self { reference, output }
    }

    fn key<'a>(&self, state: &'a StateRecord) -> Option<&'a str> {
        state.get_path(&self.reference)?.as_str()
    }
}

fn acquire_all(
    cache: &mut PayloadCache,
    bindings: &[PayloadBinding],
    state: &StateRecord,
) -> Vec<String> {
    let mut keys = Vec::new();
    for binding in bindings {
        if let Some(key) = binding.key(state) {
            cache.acquire(key);
            keys.push(key.to_string());
        }
    }
    keys
}

fn release_all(
    cache: &mut PayloadCache,
    bindings: &[PayloadBinding],
    state: &StateRecord,
) -> Result<(), PrefetchError> {
    for binding in bindings {
        if let Some(key) = binding.key(state) {
            cache.release(key)?;
        }
    }
    Ok(())
}

/// Copy spliced payloads from `prev` into `next`, a state rebuilt from the inner animator,
/// wherever the reference key is unchanged. Payloads that cannot be carried are marked changed.
fn carry_payloads(
    bindings: &[PayloadBinding],
    prev: &StateRecord,
    next: &mut StateRecord,
    changes: &mut ChangeSet,
) {
    for binding in bindings {
        let Some(StateValue::Bytes(bytes)) = prev.get_path(&binding.output) else {
            continue;
        };
        let key = binding.key(prev);
        if key.is_none() || key != binding.key(next) {
            changes.mark(&binding.output.to_string());
            continue;
        }
        if next.get_path(&binding.output).is_none() {
            next.set_path(&binding.output, StateValue::Bytes(Arc::clone(bytes)));
        }
    }
}

#[derive(Debug)]
pub struct LookaheadAnimator<A: Animator> {
    inner: A,
    config: LookaheadConfig,
    bindings: Vec<PayloadBinding>,
    cache: PayloadCache,
    /// Frame indices currently holding references.
    window: Range<usize>,
    output: StateRecord,
    changes: ChangeSet,
}

impl<A: Animator> LookaheadAnimator<A> {
    pub fn new(
        inner: A,
        config: LookaheadConfig,
        cache: PayloadCache,
        bindings: Vec<PayloadBinding>,
    ) -> Self {
        Self {
            inner,
            config,
            bindings,
            cache,
            window: 0..0,
            output: StateRecord::new(),
            changes: ChangeSet::new(),
        }
    }

    /// Build the cache on the ambient tokio runtime with `config.max_jobs` concurrent loads.
    pub fn with_loader(
        inner: A,
        config: LookaheadConfig,
        loader: Arc<dyn PayloadLoader>,
        fetch: FetchOptions,
        bindings: Vec<PayloadBinding>,
    ) -> Result<Self, PrefetchError> {
        let runner = JobRunner::current(config.max_jobs)?;
        let cache = PayloadCache::new(runner, loader, fetch);
        Ok(Self::new(inner, config, cache, bindings))
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn cache(&self) -> &PayloadCache {
        &self.cache
    }

    pub fn config(&self) -> &LookaheadConfig {
        &self.config
    }

    pub fn bindings(&self) -> &[PayloadBinding] {
        &self.bindings
    }

    /// Frame indices currently holding payload references.
    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    /// Take a reference on every payload named by `state`. Returns the keys acquired.
    pub fn preload_data(&mut self, state: &StateRecord) -> Vec<String> {
        acquire_all(&mut self.cache, &self.bindings, state)
    }

    /// Release the references taken by [`Self::preload_data`] for `state`.
    pub fn unload_data(&mut self, state: &StateRecord) -> Result<(), PrefetchError> {
        release_all(&mut self.cache, &self.bindings, state)
    }

    /// Splice loaded payloads into `state`, marking each written path in `changes`.
    /// Returns whether anything was written.
    pub fn process_state(&self, state: &mut StateRecord, changes: &mut ChangeSet) -> bool {
        let mut changed = false;
        for binding in &self.bindings {
            let Some(key) = binding.key(state) else {
                continue;
            };
            let Some(payload) = self.cache.payload(key) else {
                continue;
            };
            let current = matches!(
                state.get_path(&binding.output),
                Some(StateValue::Bytes(bytes)) if Arc::ptr_eq(bytes, &payload)
            );
            if current {
                continue;
            }
            state.set_path(&binding.output, StateValue::Bytes(payload));
            changes.mark(&binding.output.to_string());
            changed = true;
        }
        changed
    }

    fn window_for(store: &FrameStore, config: &LookaheadConfig, t: f64) -> Range<usize> {
        let mut start = store.count_before(t - config.look_back);
        if let Some(cursor) = store.index_at_or_before(t) {
            start = start.min(cursor);
        }
        if store.is_backfilled() {
            start = start.max(1);
        }
        let end = store.count_at_or_before(t + config.look_ahead).max(start);
        start..end
    }

    /// Move the reference window to `t`: frames entering are preloaded before frames
    /// leaving are unloaded, so payloads shared across the boundary are never dropped.
    /// On error neither the cache nor the window is touched.
    fn update_window(&mut self, t: f64) -> Result<(), PrefetchError> {
        let store = self.inner.frames();
        let next = Self::window_for(store, &self.config, t);
        let entering: Vec<&StateRecord> = next
            .clone()
            .filter(|i| !self.window.contains(i))
            .filter_map(|i| store.get(i))
            .map(|frame| &frame.state)
            .collect();
        let leaving: Vec<&StateRecord> = self
            .window
            .clone()
            .filter(|i| !next.contains(i))
            .filter_map(|i| store.get(i))
            .map(|frame| &frame.state)
            .collect();

        let mut balance: HashMap<&str, isize> = HashMap::new();
        for (group, delta) in [(&entering, 1), (&leaving, -1)] {
            for &state in group {
                for key in self.bindings.iter().filter_map(|b| b.key(state)) {
                    let held = self.cache.ref_count(key) as isize;
                    *balance.entry(key).or_insert(held) += delta;
                }
            }
        }
        if let Some((key, _)) = balance.iter().find(|(_, count)| **count < 0) {
            return Err(PrefetchError::RefCountUnderflow {
                key: key.to_string(),
            });
        }

        for &state in &entering {
            acquire_all(&mut self.cache, &self.bindings, state);
        }
        for &state in &leaving {
            release_all(&mut self.cache, &self.bindings, state)?;
        }
        self.window = next;
        Ok(())
    }

    /// Release every held reference and cancel outstanding loads.
    fn release_window(&mut self) -> Result<(), PrefetchError> {
        let store = self.inner.frames();
        let window = std::mem::replace(&mut self.window, 0..0);
        for index in window {
            if let Some(frame) = store.get(index) {
                release_all(&mut self.cache, &self.bindings, &frame.state)?;
            }
        }
        Ok(())
    }
}

impl<A: Animator> Animator for LookaheadAnimator<A> {
    fn set_time(&mut self, t: f64) -> Result<(), AnimatorError> {
        self.inner.set_time(t)?;
        let mut changes = self.inner.changes().clone();
        if !changes.is_empty() {
            let mut rebuilt = self.inner.state().clone();
            carry_payloads(&self.bindings, &self.output, &mut rebuilt, &mut changes);
            self.output = rebuilt;
        }
        self.changes = changes;

        self.update_window(t)?;
        self.cache.poll();
        let mut output = std::mem::take(&mut self.output);
        let mut changes = std::mem::take(&mut self.changes);
        self.process_state(&mut output, &mut changes);
        self.output = output;
        self.changes = changes;
        Ok(())
    }

    fn state(&self) -> &StateRecord {
        &self.output
    }

    fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    fn time(&self) -> Option<f64> {
        self.inner.time()
    }

    fn frames(&self) -> &FrameStore {
        self.inner.frames()
    }

    fn reset(&mut self) {
        if let Err(err) = self.release_window() {
            error!("lookahead reset left the payload cache inconsistent: {err}");
            self.cache.clear();
        }
        self.inner.reset();
        self.output.clear();
        self.changes.clear();
    }
}
