//! Interpolation for ROS-style transform records.
//!
//! A transform is any record holding `translation: {x, y, z}` and `rotation: {x, y, z, w}`.
//! Translations are lerped, rotations slerped. Everything else keeps the current value.

use honeycomb_api_core::{StateRecord, StateValue};

use super::functions::{lerp_vec3, slerp_quat};

const TRANSLATION: &str = "translation";
const ROTATION: &str = "rotation";

fn read_vec3(record: &StateRecord) -> Option<[f64; 3]> {
    Some([
        record.number("x")?,
        record.number("y")?,
        record.number("z")?,
    ])
}

fn read_quat(record: &StateRecord) -> Option<[f64; 4]> {
    Some([
        record.number("x")?,
        record.number("y")?,
        record.number("z")?,
        record.number("w")?,
    ])
}

fn child<'a>(record: &'a StateRecord, key: &str) -> Option<&'a StateRecord> {
    record.get(key).and_then(StateValue::as_record)
}

fn write_components(record: &mut StateRecord, keys: &[&str], values: &[f64]) {
    for (key, value) in keys.iter().zip(values) {
        record.insert(*key, *value);
    }
}

/// Returns true when `curr`/`next` were both transforms and `target` was updated.
fn interpolate_transform(
    curr: &StateRecord,
    next: &StateRecord,
    ratio: f64,
    target: &mut StateRecord,
) -> bool {
    let pair = |key: &str| Some((child(curr, key)?, child(next, key)?));
    let (Some((ta, tb)), Some((ra, rb))) = (pair(TRANSLATION), pair(ROTATION)) else {
        return false;
    };
    let (Some(pa), Some(pb), Some(qa), Some(qb)) =
        (read_vec3(ta), read_vec3(tb), read_quat(ra), read_quat(rb))
    else {
        return false;
    };

    let p = lerp_vec3(pa, pb, ratio);
    let q = slerp_quat(qa, qb, ratio);
    write_components(target.record_entry(TRANSLATION), &["x", "y", "z"], &p);
    write_components(target.record_entry(ROTATION), &["x", "y", "z", "w"], &q);
    true
}

/// Walk both records and interpolate every transform found at any depth.
pub fn interpolate_transforms(
    curr: &StateRecord,
    next: &StateRecord,
    ratio: f64,
    target: &mut StateRecord,
) {
    if interpolate_transform(curr, next, ratio, target) {
        return;
    }
    for (key, next_value) in next.iter() {
        if let (Some(StateValue::Record(a)), StateValue::Record(b)) = (curr.get(key), next_value) {
            interpolate_transforms(a, b, ratio, target.record_entry(key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> StateRecord {
        StateRecord::from_json(v).unwrap()
    }

    #[test]
    fn nested_transforms_are_interpolated() {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let curr = rec(json!({
            "tf": { "base_link": {
                "translation": { "x": 0.0, "y": 0.0, "z": 0.0 },
                "rotation": { "x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0 },
                "frame_id": "odom"
            }},
            "battery": 10.0
        }));
        let next = rec(json!({
            "tf": { "base_link": {
                "translation": { "x": 2.0, "y": 4.0, "z": 0.0 },
                "rotation": { "x": 0.0, "y": 0.0, "z": half, "w": half },
                "frame_id": "map"
            }},
            "battery": 20.0
        }));
        let mut target = curr.clone();
        interpolate_transforms(&curr, &next, 0.5, &mut target);

        let link = target
            .get("tf")
            .and_then(StateValue::as_record)
            .and_then(|r| child(r, "base_link"))
            .unwrap();
        let t = child(link, TRANSLATION).unwrap();
        assert_eq!(t.number("x"), Some(1.0));
        assert_eq!(t.number("y"), Some(2.0));
        let r = child(link, ROTATION).unwrap();
        assert_abs_diff_eq!(
            r.number("z").unwrap(),
            (std::f64::consts::PI / 8.0).sin(),
            epsilon = 1e-12
        );
        // non-transform fields hold the current value
        assert_eq!(link.get("frame_id"), Some(&StateValue::text("odom")));
        assert_eq!(target.number("battery"), Some(10.0));
    }

    #[test]
    fn incomplete_transforms_are_skipped() {
        let curr = rec(json!({ "translation": { "x": 0.0, "y": 0.0, "z": 0.0 } }));
        let next = rec(json!({ "translation": { "x": 1.0, "y": 1.0, "z": 1.0 } }));
        let mut target = curr.clone();
        interpolate_transforms(&curr, &next, 0.5, &mut target);
        assert_eq!(target, curr);
    }
}
