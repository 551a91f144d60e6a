//! Wray math types.
//!
//! Double-precision vectors and matrices come from glam; this crate adds the
//! renderer-specific pieces on top: HDR [`Color`], the BVH's [`Aabb`], and a
//! few vector conveniences through [`Vec3Ext`].

pub use glam::{DMat4, DVec3};

/// 3-component vector used for positions, directions and normals.
pub type Vec3 = DVec3;

/// 4×4 matrix (column-major).
pub type Mat4 = DMat4;

mod aabb;
mod color;
mod interval;
mod vector;

pub use aabb::Aabb;
pub use color::Color;
pub use interval::Interval;
pub use vector::{Vec3Ext, NORMALIZE_EPSILON};
