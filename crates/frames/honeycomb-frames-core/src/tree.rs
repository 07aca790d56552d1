//! Named frame hierarchy.
//!
//! Each frame has at most one parent and a pose local to it. Parents may be named before
//! they are defined (telemetry often publishes children first); resolving a world
//! transform through a missing parent is an [`TransformError::UnknownFrame`].

use hashbrown::HashMap;
use log::debug;
use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3};

use crate::error::TransformError;
use crate::transform::{pose_matrix, relative_matrix, FrameTransformer};
use honeycomb_api_core::{StateRecord, StateValue};

#[derive(Clone, Debug, PartialEq)]
struct FrameNode {
    parent: Option<String>,
    local: Matrix4<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct FrameTree {
    frames: HashMap<String, FrameNode>,
}

impl FrameTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.contains_key(name)
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        self.frames.get(name)?.parent.as_deref()
    }

    pub fn local_transform(&self, name: &str) -> Option<&Matrix4<f64>> {
        self.frames.get(name).map(|node| &node.local)
    }

    /// Insert or update `name`. Re-parenting under one of its own descendants is rejected.
    pub fn set_frame(
        &mut self,
        name: &str,
        parent: Option<&str>,
        local: Matrix4<f64>,
    ) -> Result<(), TransformError> {
        if let Some(parent) = parent {
            if self.is_ancestor_or_self(name, parent) {
                return Err(TransformError::Cycle {
                    frame: name.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        self.frames.insert(
            name.to_string(),
            FrameNode {
                parent: parent.map(str::to_string),
                local,
            },
        );
        Ok(())
    }

    /// True when walking up from `start` reaches `name`.
    fn is_ancestor_or_self(&self, name: &str, start: &str) -> bool {
        let mut current = Some(start);
        while let Some(frame) = current {
            if frame == name {
                return true;
            }
            current = self.parent(frame);
        }
        false
    }

    /// Remove `name`, re-attaching its children to its parent so their world poses hold.
    pub fn remove_frame(&mut self, name: &str) -> Option<Matrix4<f64>> {
        let removed = self.frames.remove(name)?;
        for node in self.frames.values_mut() {
            if node.parent.as_deref() == Some(name) {
                node.parent = removed.parent.clone();
                node.local = removed.local * node.local;
            }
        }
        Some(removed.local)
    }

    /// Pose of `name` in the root of its tree.
    pub fn world_transform(&self, name: &str) -> Result<Matrix4<f64>, TransformError> {
        let node = self
            .frames
            .get(name)
            .ok_or_else(|| TransformError::UnknownFrame(name.to_string()))?;
        let mut world = node.local;
        let mut parent = node.parent.as_deref();
        while let Some(frame) = parent {
            let node = self
                .frames
                .get(frame)
                .ok_or_else(|| TransformError::UnknownFrame(frame.to_string()))?;
            world = node.local * world;
            parent = node.parent.as_deref();
        }
        Ok(world)
    }

    /// Pose of `from` expressed in `to`.
    pub fn relative_transform(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Matrix4<f64>, TransformError> {
        relative_matrix(&self.world_transform(from)?, &self.world_transform(to)?)
    }

    pub fn transformer(&self, from: &str, to: &str) -> Result<FrameTransformer, TransformError> {
        FrameTransformer::new(&self.world_transform(from)?, &self.world_transform(to)?)
    }

    /// Update frames from a record keyed by frame id, each entry shaped like
    /// `{ parent?, translation?: {x,y,z}, rotation?: {x,y,z,w}, scale?: {x,y,z} }`.
    /// Missing parts default to identity. Returns the number of frames written.
    pub fn apply_state(&mut self, transforms: &StateRecord) -> Result<usize, TransformError> {
        let mut written = 0;
        for (name, value) in transforms.iter() {
            let entry = value.as_record().ok_or_else(|| invalid(name, "not a record"))?;
            let parent = match entry.get("parent") {
                None | Some(StateValue::Null) => None,
                Some(StateValue::Text(parent)) => Some(parent.as_str()),
                Some(_) => return Err(invalid(name, "parent must be a frame id")),
            };
            let translation = vector(name, entry.get("translation"), 0.0)?;
            let scale = vector(name, entry.get("scale"), 1.0)?;
            let rotation = rotation(name, entry.get("rotation"))?;
            self.set_frame(name, parent, pose_matrix(&translation, &rotation, &scale))?;
            written += 1;
        }
        if written > 0 {
            debug!("frame tree updated {written} frames ({} total)", self.len());
        }
        Ok(written)
    }
}

fn invalid(frame: &str, reason: impl Into<String>) -> TransformError {
    TransformError::InvalidRecord {
        frame: frame.to_string(),
        reason: reason.into(),
    }
}

fn component(
    frame: &str,
    record: &StateRecord,
    key: &str,
    default: f64,
) -> Result<f64, TransformError> {
    match record.get(key) {
        None => Ok(default),
        Some(StateValue::Number(n)) if n.is_finite() => Ok(*n),
        Some(_) => Err(invalid(frame, format!("'{key}' must be a finite number"))),
    }
}

fn vector(
    frame: &str,
    value: Option<&StateValue>,
    default: f64,
) -> Result<Vector3<f64>, TransformError> {
    let Some(value) = value else {
        return Ok(Vector3::repeat(default));
    };
    let record = value
        .as_record()
        .ok_or_else(|| invalid(frame, "expected an {x, y, z} record"))?;
    Ok(Vector3::new(
        component(frame, record, "x", default)?,
        component(frame, record, "y", default)?,
        component(frame, record, "z", default)?,
    ))
}

fn rotation(
    frame: &str,
    value: Option<&StateValue>,
) -> Result<UnitQuaternion<f64>, TransformError> {
    let Some(value) = value else {
        return Ok(UnitQuaternion::identity());
    };
    let record = value
        .as_record()
        .ok_or_else(|| invalid(frame, "expected an {x, y, z, w} record"))?;
    let q = Quaternion::new(
        component(frame, record, "w", 1.0)?,
        component(frame, record, "x", 0.0)?,
        component(frame, record, "y", 0.0)?,
        component(frame, record, "z", 0.0)?,
    );
    UnitQuaternion::try_new(q, 1e-12).ok_or_else(|| invalid(frame, "zero-length rotation"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use serde_json::json;

    fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    fn rover_tree() -> FrameTree {
        let mut tree = FrameTree::new();
        tree.set_frame("site", None, Matrix4::identity()).unwrap();
        tree.set_frame("rover", Some("site"), translation(5.0, 0.0, 0.0)).unwrap();
        tree.set_frame("mast", Some("rover"), translation(0.0, 0.0, 2.0)).unwrap();
        tree.set_frame("arm", Some("rover"), translation(1.0, 0.0, 0.5)).unwrap();
        tree
    }

    #[test]
    fn world_and_relative_transforms_compose() {
        let tree = rover_tree();
        let mast = tree.world_transform("mast").unwrap();
        assert_relative_eq!(mast, translation(5.0, 0.0, 2.0), epsilon = 1e-12);

        let arm_in_mast = tree.relative_transform("arm", "mast").unwrap();
        assert_relative_eq!(arm_in_mast, translation(1.0, 0.0, -1.5), epsilon = 1e-12);

        let t = tree.transformer("arm", "site").unwrap();
        assert_relative_eq!(
            t.point(Point3::origin()),
            Point3::new(6.0, 0.0, 0.5),
            epsilon = 1e-12
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut tree = rover_tree();
        let err = tree.set_frame("rover", Some("mast"), Matrix4::identity()).unwrap_err();
        assert!(matches!(err, TransformError::Cycle { .. }));
        assert!(tree.set_frame("site", Some("site"), Matrix4::identity()).is_err());
        // the failed update left the tree untouched
        assert_eq!(tree.parent("rover"), Some("site"));
    }

    #[test]
    fn unknown_parents_fail_on_resolve() {
        let mut tree = FrameTree::new();
        tree.set_frame("camera", Some("mast"), Matrix4::identity()).unwrap();
        assert_eq!(
            tree.world_transform("camera"),
            Err(TransformError::UnknownFrame("mast".into()))
        );
        assert_eq!(
            tree.world_transform("nowhere"),
            Err(TransformError::UnknownFrame("nowhere".into()))
        );
    }

    #[test]
    fn removing_a_frame_keeps_children_in_place() {
        let mut tree = rover_tree();
        let before = tree.world_transform("mast").unwrap();
        tree.remove_frame("rover").unwrap();
        assert_eq!(tree.parent("mast"), Some("site"));
        assert_relative_eq!(tree.world_transform("mast").unwrap(), before, epsilon = 1e-12);
        assert!(tree.remove_frame("rover").is_none());
    }

    #[test]
    fn apply_state_reads_transform_records() {
        let mut tree = FrameTree::new();
        let state = StateRecord::from_json(json!({
            "odom": {},
            "base_link": {
                "parent": "odom",
                "translation": { "x": 1.0, "y": 2.0, "z": 0.0 },
                "rotation": { "z": 0.7071067811865476, "w": 0.7071067811865476 }
            }
        }))
        .unwrap();
        assert_eq!(tree.apply_state(&state).unwrap(), 2);
        let p = tree
            .transformer("base_link", "odom")
            .unwrap()
            .point(Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.0, 3.0, 0.0), epsilon = 1e-9);

        let bad =
            StateRecord::from_json(json!({ "mast": { "translation": { "x": "far" } } })).unwrap();
        assert!(matches!(
            tree.apply_state(&bad),
            Err(TransformError::InvalidRecord { .. })
        ));
    }
}
