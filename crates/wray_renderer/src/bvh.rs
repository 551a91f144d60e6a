//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! Binary tree of axis-aligned boxes built top-down. Each split picks the
//! cheapest of a few random candidate planes under a surface-area cost, and
//! each node's box tightly bounds the triangles beneath it.

use std::time::Instant;

use rand::{Rng, RngCore};
use wray_core::{RenderError, RenderResult};
use wray_math::{Aabb, Interval};

use crate::{Hit, Ray, Triangle};

/// Nodes at this depth always become leaves.
pub const MAX_DEPTH: usize = 30;

/// Nodes with at most this many triangles become leaves.
pub const MIN_LEAF_SIZE: usize = 3;

/// Random split planes tried per node.
const SPLIT_CANDIDATES: usize = 5;

const COST_NODE_INTERSECTION: f64 = 1.0;
const COST_TRIANGLE_INTERSECTION: f64 = 5.0;

/// BVH node - either a branch with two children or a leaf with triangles.
#[derive(Debug)]
pub enum BvhNode {
    Branch {
        left: Box<BvhNode>,
        right: Box<BvhNode>,
        bbox: Aabb,
    },
    Leaf {
        triangles: Vec<Triangle>,
        bbox: Aabb,
    },
}

/// Immutable BVH over a triangle mesh. Read-only once built.
#[derive(Debug)]
pub struct Bvh {
    root: BvhNode,
    triangle_count: usize,
}

impl Bvh {
    /// Build a BVH over `triangles`.
    ///
    /// Fails with [`RenderError::FatalAssertion`] if a split ever loses or
    /// duplicates triangles.
    pub fn build(triangles: Vec<Triangle>, rng: &mut dyn RngCore) -> RenderResult<Self> {
        let start = Instant::now();
        let triangle_count = triangles.len();

        let root = BvhNode::build(triangles, 0, rng)?;

        log::debug!(
            "Built BVH over {} triangles in {:.2?} (depth {})",
            triangle_count,
            start.elapsed(),
            root.depth()
        );

        Ok(Self {
            root,
            triangle_count,
        })
    }

    pub fn root(&self) -> &BvhNode {
        &self.root
    }

    /// Number of triangles the BVH was built from.
    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    pub fn bounding_box(&self) -> Aabb {
        self.root.bounding_box()
    }

    /// Closest triangle hit along the ray, if any.
    ///
    /// Both children of every branch the ray touches are visited, since the
    /// nearest hit may lie in either one.
    pub fn intersect_closest(&self, ray: &Ray, epsilon: f64) -> Option<Hit<'_>> {
        let inv_dir = ray.inv_direction();
        let mut closest: Option<Hit<'_>> = None;

        if self.root.bounding_box().hit(ray.origin(), inv_dir) {
            self.root.intersect(ray, inv_dir, epsilon, &mut closest);
        }
        closest
    }
}

impl BvhNode {
    fn build(triangles: Vec<Triangle>, depth: usize, rng: &mut dyn RngCore) -> RenderResult<Self> {
        let bbox = mesh_bounds(&triangles);

        if depth >= MAX_DEPTH || triangles.len() <= MIN_LEAF_SIZE {
            return Ok(BvhNode::Leaf { triangles, bbox });
        }

        // Axis cycles x, y, z with depth
        let axis = depth % 3;
        let left_box = choose_split(&triangles, &bbox, axis, rng);

        let parent_count = triangles.len();
        let (left, right): (Vec<_>, Vec<_>) = triangles
            .into_iter()
            .partition(|tri| is_fully_inside(tri, &left_box));

        if left.len() + right.len() != parent_count {
            return Err(RenderError::FatalAssertion(format!(
                "BVH split lost triangles: {} + {} != {}",
                left.len(),
                right.len(),
                parent_count
            )));
        }

        Ok(BvhNode::Branch {
            left: Box::new(Self::build(left, depth + 1, rng)?),
            right: Box::new(Self::build(right, depth + 1, rng)?),
            bbox,
        })
    }

    pub fn bounding_box(&self) -> Aabb {
        match self {
            BvhNode::Branch { bbox, .. } | BvhNode::Leaf { bbox, .. } => *bbox,
        }
    }

    /// Longest root-to-leaf path; a lone leaf has depth 0.
    pub fn depth(&self) -> usize {
        match self {
            BvhNode::Leaf { .. } => 0,
            BvhNode::Branch { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Visit every leaf, left to right.
    pub fn for_each_leaf<'a>(&'a self, visit: &mut dyn FnMut(&'a [Triangle], &'a Aabb)) {
        match self {
            BvhNode::Leaf { triangles, bbox } => visit(triangles, bbox),
            BvhNode::Branch { left, right, .. } => {
                left.for_each_leaf(visit);
                right.for_each_leaf(visit);
            }
        }
    }

    /// Total triangles stored in leaves.
    pub fn leaf_triangle_count(&self) -> usize {
        let mut total = 0;
        self.for_each_leaf(&mut |triangles, _| total += triangles.len());
        total
    }

    fn intersect<'a>(
        &'a self,
        ray: &Ray,
        inv_dir: wray_math::Vec3,
        epsilon: f64,
        closest: &mut Option<Hit<'a>>,
    ) {
        match self {
            BvhNode::Leaf { triangles, .. } => {
                for triangle in triangles {
                    let Some((distance, u, v)) = triangle.intersect(ray, epsilon) else {
                        continue;
                    };
                    let max = closest.map_or(f64::INFINITY, |hit| hit.distance);
                    if Interval::new(0.0, max).surrounds(distance) {
                        *closest = Some(Hit {
                            triangle,
                            distance,
                            u,
                            v,
                            w: 1.0 - u - v,
                        });
                    }
                }
            }
            BvhNode::Branch { left, right, .. } => {
                for child in [left, right] {
                    if child.bounding_box().hit(ray.origin(), inv_dir) {
                        child.intersect(ray, inv_dir, epsilon, closest);
                    }
                }
            }
        }
    }
}

/// Box around every vertex of the mesh; empty for an empty mesh.
fn mesh_bounds(triangles: &[Triangle]) -> Aabb {
    Aabb::enclosing(triangles.iter().flat_map(|tri| *tri.positions()))
}

/// A triangle goes left only if all three vertices are inside the left box.
/// Straddling triangles are never clipped and always go right.
fn is_fully_inside(triangle: &Triangle, left_box: &Aabb) -> bool {
    triangle
        .positions()
        .iter()
        .all(|&p| left_box.contains_point(p, 0.0))
}

/// Try random split planes along `axis` and return the lowest-cost left box.
fn choose_split(triangles: &[Triangle], parent: &Aabb, axis: usize, rng: &mut dyn RngCore) -> Aabb {
    let mut best_box = *parent;
    let mut lowest_cost = f64::INFINITY;

    for _ in 0..SPLIT_CANDIDATES {
        let split = parent.min[axis] + (parent.max[axis] - parent.min[axis]) * rng.gen::<f64>();
        let left_box = parent.with_max_on_axis(axis, split);

        let mut left_bounds = Aabb::EMPTY;
        let mut right_bounds = Aabb::EMPTY;
        let mut left_count = 0usize;

        for tri in triangles {
            let side = if is_fully_inside(tri, &left_box) {
                left_count += 1;
                &mut left_bounds
            } else {
                &mut right_bounds
            };
            for &p in tri.positions() {
                *side = side.grow(p);
            }
        }
        let right_count = triangles.len() - left_count;

        let cost = COST_NODE_INTERSECTION
            + left_bounds.surface_area() * left_count as f64 * COST_TRIANGLE_INTERSECTION
            + right_bounds.surface_area() * right_count as f64 * COST_TRIANGLE_INTERSECTION;

        if cost < lowest_cost {
            lowest_cost = cost;
            best_box = left_box;
        }
    }

    best_box
}
