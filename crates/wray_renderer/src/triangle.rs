//! Triangle primitive for ray tracing.
//!
//! Uses the Möller-Trumbore algorithm for ray-triangle intersection.

use std::sync::Arc;

use wray_core::{RenderError, RenderResult};
use wray_math::{Aabb, Vec3, Vec3Ext};

use crate::{Material, Ray};

/// A triangle corner as given by the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    /// Shading normal; filled from the face normal when absent.
    pub normal: Option<Vec3>,
}

impl Vertex {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            normal: None,
        }
    }

    pub fn with_normal(position: Vec3, normal: Vec3) -> Self {
        Self {
            position,
            normal: Some(normal),
        }
    }
}

/// A triangle with per-vertex shading normals. Immutable once built.
#[derive(Debug, Clone)]
pub struct Triangle {
    positions: [Vec3; 3],
    normals: [Vec3; 3],
    /// Unit normal from counter-clockwise winding
    face_normal: Vec3,
    material: Arc<Material>,
}

/// Closest intersection of a ray with the scene.
#[derive(Debug, Clone, Copy)]
pub struct Hit<'a> {
    pub triangle: &'a Triangle,
    pub distance: f64,
    /// Barycentric weight of the second vertex
    pub u: f64,
    /// Barycentric weight of the third vertex
    pub v: f64,
    /// Barycentric weight of the first vertex, `1 - u - v`
    pub w: f64,
}

impl Triangle {
    /// Create a triangle from exactly three vertices.
    ///
    /// If any vertex lacks a normal, all three normals are replaced by the
    /// face normal so shading stays consistent across the face.
    pub fn new(vertices: &[Vertex], material: Arc<Material>) -> RenderResult<Self> {
        let [a, b, c] = match vertices {
            [a, b, c] => [*a, *b, *c],
            _ => {
                return Err(RenderError::Geometry(format!(
                    "a triangle needs exactly 3 vertices, got {}",
                    vertices.len()
                )))
            }
        };

        let positions = [a.position, b.position, c.position];
        let face_normal = (positions[1] - positions[0])
            .cross(positions[2] - positions[0])
            .normalized();

        let normals = match (a.normal, b.normal, c.normal) {
            (Some(na), Some(nb), Some(nc)) => [na, nb, nc],
            _ => [face_normal; 3],
        };

        Ok(Self {
            positions,
            normals,
            face_normal,
            material,
        })
    }

    #[inline]
    pub fn positions(&self) -> &[Vec3; 3] {
        &self.positions
    }

    #[inline]
    pub fn normals(&self) -> &[Vec3; 3] {
        &self.normals
    }

    #[inline]
    pub fn face_normal(&self) -> Vec3 {
        self.face_normal
    }

    #[inline]
    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::enclosing(self.positions)
    }

    /// Shading normal at barycentric `(w, u, v)`, normalized.
    pub fn interpolated_normal(&self, u: f64, v: f64, w: f64) -> Vec3 {
        (self.normals[0] * w + self.normals[1] * u + self.normals[2] * v).normalized()
    }

    /// Möller-Trumbore ray-triangle intersection.
    ///
    /// Returns `(distance, u, v)` for hits strictly in front of the ray origin.
    pub fn intersect(&self, ray: &Ray, epsilon: f64) -> Option<(f64, f64, f64)> {
        let [p0, p1, p2] = self.positions;
        let edge1 = p1 - p0;
        let edge2 = p2 - p0;

        let pv = ray.direction().cross(edge2);
        let det = edge1.dot(pv);

        // Ray is parallel to triangle
        if det.abs() < epsilon {
            return None;
        }

        let inv_det = 1.0 / det;
        let tv = ray.origin() - p0;
        let u = tv.dot(pv) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let qv = tv.cross(edge1);
        let v = ray.direction().dot(qv) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let distance = edge2.dot(qv) * inv_det;
        if distance <= 0.0 {
            return None;
        }

        Some((distance, u, v))
    }
}
