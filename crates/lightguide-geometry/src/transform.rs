//! Rigid transformations for tilting planar outlines into 3-D.
//!
//! Rotations are composed as $R = R_x R_y R_z$ from per-axis angles in
//! degrees and applied about a chosen centre, so a tilted eyebox stays
//! centred on its nominal position.

use nalgebra::{Matrix3, Rotation3, Vector3};

/// An affine transformation: rotation matrix + translation.
#[derive(Debug, Clone)]
pub struct Transform {
    /// 3x3 rotation matrix.
    pub matrix: Matrix3<f64>,
    /// Translation vector (mm).
    pub translation: Vector3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

impl Transform {
    /// Create a pure translation.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            matrix: Matrix3::identity(),
            translation: Vector3::new(dx, dy, dz),
        }
    }

    /// Rotation about the origin by `[rx, ry, rz]` degrees, $R = R_x R_y R_z$.
    pub fn rotation_deg(angles: [f64; 3]) -> Self {
        let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), angles[0].to_radians());
        let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), angles[1].to_radians());
        let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), angles[2].to_radians());
        Self {
            matrix: (rx * ry * rz).into_inner(),
            translation: Vector3::zeros(),
        }
    }

    /// Same rotation, but about `centre` instead of the origin.
    pub fn rotation_about(centre: [f64; 3], angles: [f64; 3]) -> Self {
        Transform::translation(-centre[0], -centre[1], -centre[2])
            .then(&Transform::rotation_deg(angles))
            .then(&Transform::translation(centre[0], centre[1], centre[2]))
    }

    /// Apply this transformation to a 3D point.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        let v = Vector3::new(point[0], point[1], point[2]);
        let result = self.matrix * v + self.translation;
        [result.x, result.y, result.z]
    }

    /// Compose two transforms: self followed by other.
    pub fn then(&self, other: &Transform) -> Transform {
        Transform {
            matrix: other.matrix * self.matrix,
            translation: other.matrix * self.translation + other.translation,
        }
    }
}
