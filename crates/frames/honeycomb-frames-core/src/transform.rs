//! Change-of-frame helpers.
//!
//! Every function takes the pose of the source frame and of the target frame, both as
//! 4x4 homogeneous matrices in a common parent, and returns the input re-expressed in the
//! target frame. Inputs are taken by value, so updating in place reads
//! `p = transform_point(&a, &b, p)?`.

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Point3, Rotation3, Translation3, UnitQuaternion, Vector3,
};

use crate::error::TransformError;

const SCALE_EPSILON: f64 = 1e-12;

/// `inverse(to) * from`: maps coordinates in `from` to coordinates in `to`.
pub fn relative_matrix(
    from: &Matrix4<f64>,
    to: &Matrix4<f64>,
) -> Result<Matrix4<f64>, TransformError> {
    let to_inv = to.try_inverse().ok_or(TransformError::Singular)?;
    Ok(to_inv * from)
}

/// Rotation part of an affine matrix with any per-axis scale divided out.
pub fn rotation_of(m: &Matrix4<f64>) -> Result<UnitQuaternion<f64>, TransformError> {
    let mut basis: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    for i in 0..3 {
        let norm = basis.column(i).norm();
        if norm <= SCALE_EPSILON {
            return Err(TransformError::Singular);
        }
        let unit = basis.column(i) / norm;
        basis.set_column(i, &unit);
    }
    // mirrored bases keep the reflection in the scale, not the rotation
    if basis.determinant() < 0.0 {
        let flipped = -basis.column(0);
        basis.set_column(0, &flipped);
    }
    Ok(UnitQuaternion::from_rotation_matrix(
        &Rotation3::from_matrix_unchecked(basis),
    ))
}

/// Homogeneous matrix for `translation * rotation * scale`.
pub fn pose_matrix(
    translation: &Vector3<f64>,
    rotation: &UnitQuaternion<f64>,
    scale: &Vector3<f64>,
) -> Matrix4<f64> {
    Isometry3::from_parts(Translation3::from(*translation), *rotation).to_homogeneous()
        * Matrix4::new_nonuniform_scaling(scale)
}

pub fn transform_point(
    from: &Matrix4<f64>,
    to: &Matrix4<f64>,
    point: Point3<f64>,
) -> Result<Point3<f64>, TransformError> {
    Ok(relative_matrix(from, to)?.transform_point(&point))
}

/// Like [`transform_point`] with w = 0, so translation is ignored.
pub fn transform_direction(
    from: &Matrix4<f64>,
    to: &Matrix4<f64>,
    direction: Vector3<f64>,
) -> Result<Vector3<f64>, TransformError> {
    Ok((relative_matrix(from, to)? * direction.push(0.0)).xyz())
}

/// `inverse(q_to) * q_from * rotation`, using only the rotation parts of both frames.
pub fn transform_quaternion(
    from: &Matrix4<f64>,
    to: &Matrix4<f64>,
    rotation: UnitQuaternion<f64>,
) -> Result<UnitQuaternion<f64>, TransformError> {
    let q_from = rotation_of(from)?;
    let q_to = rotation_of(to)?;
    Ok(q_to.inverse() * q_from * rotation)
}

pub fn transform_frame(
    from: &Matrix4<f64>,
    to: &Matrix4<f64>,
    frame: Matrix4<f64>,
) -> Result<Matrix4<f64>, TransformError> {
    Ok(relative_matrix(from, to)? * frame)
}

/// A `(from, to)` pair resolved once for repeated conversions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTransformer {
    matrix: Matrix4<f64>,
    rotation: UnitQuaternion<f64>,
}

impl FrameTransformer {
    pub fn new(from: &Matrix4<f64>, to: &Matrix4<f64>) -> Result<Self, TransformError> {
        let matrix = relative_matrix(from, to)?;
        let rotation = rotation_of(to)?.inverse() * rotation_of(from)?;
        Ok(Self { matrix, rotation })
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn rotation(&self) -> &UnitQuaternion<f64> {
        &self.rotation
    }

    /// The transformer for the opposite direction.
    pub fn inverse(&self) -> Result<Self, TransformError> {
        Ok(Self {
            matrix: self.matrix.try_inverse().ok_or(TransformError::Singular)?,
            rotation: self.rotation.inverse(),
        })
    }

    pub fn point(&self, point: Point3<f64>) -> Point3<f64> {
        self.matrix.transform_point(&point)
    }

    pub fn direction(&self, direction: Vector3<f64>) -> Vector3<f64> {
        (self.matrix * direction.push(0.0)).xyz()
    }

    pub fn quaternion(&self, rotation: UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        self.rotation * rotation
    }

    pub fn frame(&self, frame: Matrix4<f64>) -> Matrix4<f64> {
        self.matrix * frame
    }
}
