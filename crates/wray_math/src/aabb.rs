use crate::Vec3;

/// Axis-Aligned Bounding Box for the BVH.
///
/// Stored as min/max corners. An empty box has `min > max` on every axis,
/// so growing it by any point yields a degenerate box around that point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// A box that contains nothing.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
        max: Vec3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
    };

    /// Create an AABB from two corner points (in any order).
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest box enclosing every point of the iterator.
    pub fn enclosing<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| acc.grow(p))
    }

    /// This box extended to include `point`.
    #[inline]
    pub fn grow(&self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Extent along each axis.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Total area of the six faces. Zero for an empty box.
    pub fn surface_area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.size();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Inclusive containment test with a tolerance for float noise.
    pub fn contains_point(&self, p: Vec3, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
            && p.z >= self.min.z - tolerance
            && p.z <= self.max.z + tolerance
    }

    /// Copy of this box whose max corner is moved to `value` on `axis` (0=X, 1=Y, 2=Z).
    pub fn with_max_on_axis(&self, axis: usize, value: f64) -> Self {
        let mut max = self.max;
        max[axis] = value;
        Self { min: self.min, max }
    }

    /// Ray/box overlap test.
    ///
    /// Branchless slab method: takes the ray origin and the per-axis inverse
    /// of its direction, and reports whether the entry/exit span `[tmin, tmax]`
    /// overlaps `[0, ∞)`.
    #[inline]
    pub fn hit(&self, origin: Vec3, inv_dir: Vec3) -> bool {
        let t1 = (self.min - origin) * inv_dir;
        let t2 = (self.max - origin) * inv_dir;

        let tmin = t1.x.min(t2.x).max(t1.y.min(t2.y)).max(t1.z.min(t2.z));
        let tmax = t1.x.max(t2.x).min(t1.y.max(t2.y)).min(t1.z.max(t2.z));

        tmax >= 0.0 && tmax >= tmin
    }
}
