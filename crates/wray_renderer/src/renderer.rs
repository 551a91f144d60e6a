//! Core path tracing integrator.
//!
//! Backward unidirectional path tracing with importance-sampled materials:
//! - Recursive tracing, hard-truncated at the configured ray depth
//! - Emissive surfaces terminate paths
//! - Pixel estimates are running means kept by a [`Surface`]

use std::time::{Duration, Instant};

use rand::{Rng, RngCore};
use wray_core::RenderConfig;
use wray_math::Color;

use crate::{Bvh, Camera, Ray, Surface};

/// Radiance arriving along `ray`.
///
/// `depth` counts the bounces taken so far; primary rays start at 0.
pub fn trace(
    ray: &Ray,
    bvh: &Bvh,
    depth: u32,
    config: &RenderConfig,
    rng: &mut dyn RngCore,
) -> Color {
    let Some(hit) = bvh.intersect_closest(ray, config.epsilon) else {
        return config.sky.color(ray.direction());
    };

    let material = hit.triangle.material();
    if material.is_emissive() {
        return material.color();
    }

    if depth >= config.max_ray_depth {
        return Color::BLACK;
    }

    let normal = hit.triangle.interpolated_normal(hit.u, hit.v, hit.w);

    // Nudge off the surface along the face normal to avoid self-intersection
    let origin = ray.at(hit.distance) + hit.triangle.face_normal() * config.epsilon;
    let ray_at_hit = Ray::new(origin, ray.direction());

    match material.scatter(&ray_at_hit, normal, rng) {
        Some(scatter) => {
            let incoming = trace(&scatter.ray, bvh, depth + 1, config, rng);
            incoming * scatter.weight * material.color()
        }
        None => Color::BLACK,
    }
}

/// One path sample through pixel `(x, y)`.
pub fn sample_pixel(
    camera: &Camera,
    bvh: &Bvh,
    x: usize,
    y: usize,
    config: &RenderConfig,
    rng: &mut dyn RngCore,
) -> Color {
    let ray = camera.ray_toward_viewing_plane(x, y, rng);
    trace(&ray, bvh, 0, config, rng)
}

/// Outcome of one timed sampling round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundStats {
    pub samples: u64,
    /// Paths that came back NaN or infinite and were not accumulated
    pub discarded: u64,
    pub elapsed: Duration,
}

impl RoundStats {
    /// Whole samples per second over the round.
    pub fn samples_per_second(&self) -> u64 {
        let ms = self.elapsed.as_millis().max(1);
        (u128::from(self.samples) * 1000 / ms) as u64
    }
}

/// Sample uniformly random pixels into `surface` until `duration` has passed.
///
/// The surface must match the camera's viewport.
pub fn render_for(
    camera: &Camera,
    bvh: &Bvh,
    config: &RenderConfig,
    surface: &mut Surface,
    duration: Duration,
    rng: &mut dyn RngCore,
) -> RoundStats {
    let (width, height) = camera.viewport();
    debug_assert_eq!((width, height), (surface.width(), surface.height()));

    let start = Instant::now();
    let mut samples = 0u64;
    let mut discarded = 0u64;

    while start.elapsed() < duration {
        let x = rng.gen_range(0..width);
        let y = rng.gen_range(0..height);

        let color = sample_pixel(camera, bvh, x, y, config, rng);
        // Degenerate geometry can produce NaN paths; drop them
        if !color.is_finite() {
            discarded += 1;
            continue;
        }
        surface.accumulate(x, y, color);
        samples += 1;
    }

    if discarded > 0 {
        log::warn!(
            "Discarded {} non-finite samples ({} kept)",
            discarded,
            samples
        );
    }

    RoundStats {
        samples,
        discarded,
        elapsed: start.elapsed(),
    }
}

/// Apply gamma correction (gamma = 2.0).
#[inline]
pub fn linear_to_gamma(linear: f64) -> f64 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Clamp a value to [0, 1] range.
#[inline]
pub fn clamp_01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Convert a linear color to gamma-corrected 8-bit RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    let r = (255.0 * clamp_01(linear_to_gamma(color.r))) as u8;
    let g = (255.0 * clamp_01(linear_to_gamma(color.g))) as u8;
    let b = (255.0 * clamp_01(linear_to_gamma(color.b))) as u8;
    [r, g, b, 255]
}

/// Convert a linear RGBA float buffer (as produced by `Surface::to_buffer`)
/// to 8-bit preview pixels.
pub fn rgba_to_bytes(pixels: &[f64]) -> Vec<u8> {
    pixels
        .chunks_exact(4)
        .flat_map(|p| color_to_rgba(Color::new(p[0], p[1], p[2])))
        .collect()
}
