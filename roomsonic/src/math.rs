//! Math types for RoomSonic
//!
//! Every node in the scene uses the same reference axes: local `+Z` is forward and
//! local `+Y` is up. With a right-handed, Y-up world this puts a node's left hand on
//! local `+X`.

pub use glam::{Mat4, Quat, Vec3};

/// Smallest squared length a rotation or direction may have before it is treated as
/// degenerate.
const DEGENERATE_EPSILON: f32 = 1.0e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Right-hand direction, `forward × up`.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::NEG_X
    }

    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }

    /// Rotates the pose so that its forward axis points at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let direction = target - self.position;
        if direction.length_squared() > DEGENERATE_EPSILON {
            self.rotation = Quat::from_rotation_arc(Vec3::Z, direction.normalize());
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// A world-space transform sample taken from a scene node.
///
/// Produced once per world-matrix recomputation and fanned out to every backend
/// adapter, so the trigonometry downstream runs at most once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformSample {
    pub position: Vec3,
    /// Unit vector along the node's rotated `+Z` axis.
    pub forward: Vec3,
    /// Unit vector along the node's rotated `+Y` axis.
    pub up: Vec3,
    /// The world matrix the sample was decomposed from, when there was one.
    pub matrix: Option<Mat4>,
}

impl TransformSample {
    /// Decomposes a world matrix into position and orientation, discarding scale.
    ///
    /// Degenerate matrices (zero scale, NaNs) never produce a non-finite direction:
    /// the rotation falls back to identity and the position to the origin.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (_scale, rotation, translation) = matrix.to_scale_rotation_translation();

        let rotation = if rotation.is_finite() && rotation.length_squared() > DEGENERATE_EPSILON
        {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };

        let position = if translation.is_finite() {
            translation
        } else {
            Vec3::ZERO
        };

        Self {
            position,
            forward: unit_or(rotation * Vec3::Z, Vec3::Z),
            up: unit_or(rotation * Vec3::Y, Vec3::Y),
            matrix: Some(*matrix),
        }
    }

    /// Builds a sample from already decomposed vectors.
    pub fn from_vectors(position: Vec3, forward: Vec3, up: Vec3) -> Self {
        Self {
            position: if position.is_finite() {
                position
            } else {
                Vec3::ZERO
            },
            forward: unit_or(forward, Vec3::Z),
            up: unit_or(up, Vec3::Y),
            matrix: None,
        }
    }

    pub fn from_pose(pose: &Pose) -> Self {
        Self::from_matrix(&pose.to_matrix())
    }
}

impl Default for TransformSample {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::Z,
            up: Vec3::Y,
            matrix: None,
        }
    }
}

/// Normalizes `v`, or returns `fallback` when `v` is zero-length or non-finite.
pub(crate) fn unit_or(v: Vec3, fallback: Vec3) -> Vec3 {
    if v.is_finite() && v.length_squared() > DEGENERATE_EPSILON {
        v.normalize()
    } else {
        fallback
    }
}
