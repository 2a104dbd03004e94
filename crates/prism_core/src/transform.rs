use glam::{Mat4, Quat, Vec3};

/// Tolerance used when deciding whether a node transform is redundant.
pub const IDENTITY_EPSILON: f32 = 1e-6;

/// Translation / rotation / scale triple. Nodes store the composed `Mat4`;
/// this is the convenient way to build one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self {
            translation: Vec3::new(x, y, z),
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Local to parent.
    pub fn compute_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl From<Transform> for Mat4 {
    fn from(transform: Transform) -> Self {
        transform.compute_matrix()
    }
}

pub fn is_identity(matrix: &Mat4) -> bool {
    matrix.abs_diff_eq(Mat4::IDENTITY, IDENTITY_EPSILON)
}
