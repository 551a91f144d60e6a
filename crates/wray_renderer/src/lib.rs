//! Wray Renderer - CPU path tracing over triangle meshes
//!
//! A Monte Carlo path tracer: rays from a pinhole [`Camera`] are traced
//! through a [`Bvh`] of [`Triangle`]s, scattered by their [`Material`]s,
//! and the samples accumulated into a [`Surface`].

mod bvh;
mod camera;
mod material;
mod ray;
pub mod renderer;
mod scene;
mod surface;
mod triangle;

pub use bvh::{Bvh, BvhNode, MAX_DEPTH, MIN_LEAF_SIZE};
pub use camera::Camera;
pub use material::{random_in_hemisphere_cosine_weighted, reflect, Material, Scatter};
pub use ray::Ray;
pub use renderer::{color_to_rgba, render_for, rgba_to_bytes, sample_pixel, trace, RoundStats};
pub use scene::RenderScene;
pub use surface::{PixelSample, Surface, SurfaceBuffer};
pub use triangle::{Hit, Triangle, Vertex};

/// Re-export common math types from wray_math
pub use wray_math::{Aabb, Color, Interval, Vec3};
