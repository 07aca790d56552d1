//! Interpolation between two merged states.
//!
//! The playback core hands each strategy `(curr, next, ratio, target)` where `target`
//! starts as a copy of `curr`. Strategies overwrite the fields they interpolate and leave
//! everything else holding `curr`'s value.

pub mod functions;
pub mod transforms;

use std::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::error::AnimatorError;
use functions::{lerp_f64, slerp_quat};
use honeycomb_api_core::{StateRecord, StateValue};

/// Four scalar fields that together hold a unit quaternion.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RotationMap {
    pub x: String,
    pub y: String,
    pub z: String,
    pub w: String,
}

impl RotationMap {
    pub fn new(
        x: impl Into<String>,
        y: impl Into<String>,
        z: impl Into<String>,
        w: impl Into<String>,
    ) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            z: z.into(),
            w: w.into(),
        }
    }

    /// The common `{x, y, z, w}` naming.
    pub fn xyzw() -> Self {
        Self::new("x", "y", "z", "w")
    }

    fn keys(&self) -> [&str; 4] {
        [&self.x, &self.y, &self.z, &self.w]
    }

    fn read(&self, record: &StateRecord) -> Option<[f64; 4]> {
        Some([
            record.number(&self.x)?,
            record.number(&self.y)?,
            record.number(&self.z)?,
            record.number(&self.w)?,
        ])
    }
}

/// Replaceable interpolation step for domain-specific animators.
pub trait Interpolator: Send + Sync {
    fn interpolate(
        &self,
        curr: &StateRecord,
        next: &StateRecord,
        ratio: f64,
        target: &mut StateRecord,
    ) -> Result<(), String>;
}

#[derive(Clone, Default)]
pub enum InterpolationStrategy {
    /// Hold `curr` until the next frame is reached.
    Step,
    /// Slerp declared rotation groups and lerp remaining top-level numbers.
    #[default]
    Linear,
    /// Like `Linear`, recursing into nested records present in both states.
    /// Rotation maps apply inside every record by relative key.
    NestedLinear,
    /// Transform records (`translation` + `rotation`) at any depth: lerp + slerp.
    Transforms,
    Custom(Arc<dyn Interpolator>),
}

impl fmt::Debug for InterpolationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpolationStrategy::Step => f.write_str("Step"),
            InterpolationStrategy::Linear => f.write_str("Linear"),
            InterpolationStrategy::NestedLinear => f.write_str("NestedLinear"),
            InterpolationStrategy::Transforms => f.write_str("Transforms"),
            InterpolationStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl InterpolationStrategy {
    pub fn custom(interpolator: impl Interpolator + 'static) -> Self {
        InterpolationStrategy::Custom(Arc::new(interpolator))
    }

    /// Run the strategy. `ratio` is clamped to `[0, 1]` (NaN counts as 0).
    pub fn interpolate(
        &self,
        rotation_maps: &[RotationMap],
        curr: &StateRecord,
        next: &StateRecord,
        ratio: f64,
        target: &mut StateRecord,
    ) -> Result<(), AnimatorError> {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        match self {
            InterpolationStrategy::Step => {}
            InterpolationStrategy::Linear => {
                interpolate_record(rotation_maps, curr, next, ratio, target, false)
            }
            InterpolationStrategy::NestedLinear => {
                interpolate_record(rotation_maps, curr, next, ratio, target, true)
            }
            InterpolationStrategy::Transforms => {
                transforms::interpolate_transforms(curr, next, ratio, target)
            }
            InterpolationStrategy::Custom(custom) => custom
                .interpolate(curr, next, ratio, target)
                .map_err(AnimatorError::Interpolation)?,
        }
        Ok(())
    }
}

/// Default interpolation over one record level.
pub fn interpolate_record(
    rotation_maps: &[RotationMap],
    curr: &StateRecord,
    next: &StateRecord,
    ratio: f64,
    target: &mut StateRecord,
    recurse: bool,
) {
    let mut consumed: HashSet<&str> = HashSet::new();
    for map in rotation_maps {
        let (Some(a), Some(b)) = (map.read(curr), map.read(next)) else {
            continue;
        };
        let q = slerp_quat(a, b, ratio);
        for (key, component) in map.keys().into_iter().zip(q) {
            target.insert(key, component);
            consumed.insert(key);
        }
    }

    for (key, next_value) in next.iter() {
        if consumed.contains(key) {
            continue;
        }
        match (curr.get(key), next_value) {
            (Some(StateValue::Number(a)), StateValue::Number(b)) => {
                target.insert(key, lerp_f64(*a, *b, ratio));
            }
            (Some(StateValue::Record(a)), StateValue::Record(b)) if recurse => {
                let nested = target.record_entry(key);
                interpolate_record(rotation_maps, a, b, ratio, nested, true);
            }
            _ => {}
        }
    }
}
