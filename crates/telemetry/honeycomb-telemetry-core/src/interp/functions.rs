//! Interpolation helpers:
//! - lerp_f64 (exact at both ends)
//! - quaternion NLERP / SLERP with shortest-arc correction
//!
//! Quaternions are `[x, y, z, w]`.

/// Below this angle sine denominators get unstable; fall back to NLERP.
const SLERP_EPSILON: f64 = 1e-6;

/// Linear interpolation written so `t = 0` yields `a` and `t = 1` yields `b` bit for bit.
#[inline]
pub fn lerp_f64(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

#[inline]
pub fn lerp_vec3(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    [
        lerp_f64(a[0], b[0], t),
        lerp_f64(a[1], b[1], t),
        lerp_f64(a[2], b[2], t),
    ]
}

#[inline]
fn dot4(a: [f64; 4], b: [f64; 4]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

#[inline]
pub fn normalize4(mut q: [f64; 4]) -> [f64; 4] {
    let len2 = dot4(q, q);
    if len2 > 0.0 {
        let inv_len = len2.sqrt().recip();
        q[0] *= inv_len;
        q[1] *= inv_len;
        q[2] *= inv_len;
        q[3] *= inv_len;
    }
    q
}

/// Quaternion NLERP with shortest-arc correction. Returns a normalized quaternion.
#[inline]
pub fn nlerp_quat(a: [f64; 4], mut b: [f64; 4], t: f64) -> [f64; 4] {
    if dot4(a, b) < 0.0 {
        b = [-b[0], -b[1], -b[2], -b[3]];
    }
    normalize4([
        lerp_f64(a[0], b[0], t),
        lerp_f64(a[1], b[1], t),
        lerp_f64(a[2], b[2], t),
        lerp_f64(a[3], b[3], t),
    ])
}

/// Spherical linear interpolation along the shortest arc.
///
/// The endpoints are returned untouched at `t <= 0` and `t >= 1`, so a sample taken exactly
/// on a frame reproduces that frame's components even when `b` sits on the far hemisphere.
pub fn slerp_quat(a: [f64; 4], b: [f64; 4], t: f64) -> [f64; 4] {
    if t <= 0.0 {
        return a;
    }
    if t >= 1.0 {
        return b;
    }

    let mut cos_theta = dot4(a, b);
    let mut b = b;
    if cos_theta < 0.0 {
        b = [-b[0], -b[1], -b[2], -b[3]];
        cos_theta = -cos_theta;
    }

    if 1.0 - cos_theta < SLERP_EPSILON {
        return nlerp_quat(a, b, t);
    }

    let theta = cos_theta.clamp(-1.0, 1.0).acos();
    let sin_theta = theta.sin();
    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    [
        a[0] * wa + b[0] * wb,
        a[1] * wa + b[1] * wb,
        a[2] * wa + b[2] * wb,
        a[3] * wa + b[3] * wb,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn lerp_is_exact_at_ends() {
        for (a, b) in [(0.1, 0.7), (-3.3, 1e9), (1.0 / 3.0, 2.0 / 3.0)] {
            assert_eq!(lerp_f64(a, b, 0.0), a);
            assert_eq!(lerp_f64(a, b, 1.0), b);
        }
        assert_abs_diff_eq!(lerp_f64(2.0, 4.0, 0.25), 2.5);
    }

    #[test]
    fn slerp_half_turn_about_z() {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.0, half, half]; // 90 degrees about z
        let q = slerp_quat(a, b, 0.5);
        let expected = (std::f64::consts::PI / 8.0).sin();
        assert_abs_diff_eq!(q[2], expected, epsilon = 1e-12);
        assert_abs_diff_eq!(dot4(q, q), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn slerp_takes_shortest_arc_but_keeps_endpoints() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.0, -0.1, -0.995];
        assert_eq!(slerp_quat(a, b, 1.0), b);
        assert_eq!(slerp_quat(a, b, 0.0), a);
        let mid = slerp_quat(a, b, 0.5);
        assert!(mid[3] > 0.0);
    }

    #[test]
    fn slerp_near_identical_falls_back_to_nlerp() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = normalize4([0.0, 0.0, 1e-9, 1.0]);
        let q = slerp_quat(a, b, 0.5);
        assert_abs_diff_eq!(dot4(q, q), 1.0, epsilon = 1e-12);
    }
}
