use crate::{Mat4, Vec3};

/// Squared length below which a vector is treated as zero by [`Vec3Ext::normalized`].
pub const NORMALIZE_EPSILON: f64 = 1e-12;

/// Extension trait for `Vec3` with the operations the tracer relies on.
///
/// glam's own `normalize()` yields NaNs for the zero vector; the tracer
/// instead wants zero-length vectors passed through untouched.
pub trait Vec3Ext {
    /// Unit-length copy of the vector, or the vector itself if it is (near) zero.
    fn normalized(self) -> Self;

    /// The vector pointing the opposite way.
    fn reversed(self) -> Self;

    /// Component-wise scale.
    fn scaled(self, scale: Self) -> Self;

    /// Rotate by the upper-left 3×3 part of a matrix (translation ignored).
    fn rotated_by_matrix(self, matrix: &Mat4) -> Self;
}

impl Vec3Ext for Vec3 {
    #[inline]
    fn normalized(self) -> Self {
        let length_squared = self.length_squared();
        if length_squared <= NORMALIZE_EPSILON {
            return self;
        }
        self / length_squared.sqrt()
    }

    #[inline]
    fn reversed(self) -> Self {
        -self
    }

    #[inline]
    fn scaled(self, scale: Self) -> Self {
        self * scale
    }

    #[inline]
    fn rotated_by_matrix(self, matrix: &Mat4) -> Self {
        matrix.transform_vector3(self)
    }
}
