//! Render configuration threaded through the integrator.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use wray_math::{Color, Vec3, Vec3Ext};

use crate::error::{RenderError, RenderResult};

/// Offset used against self-intersection and as the ray/triangle parallelism threshold.
pub const DEFAULT_EPSILON: f64 = 0.000001;

/// Bounces after which a path is cut off and contributes black.
pub const DEFAULT_MAX_RAY_DEPTH: u32 = 10;

/// Largest accepted `maxRayDepth`. The integrator recurses once per bounce on
/// worker threads with the default stack.
pub const MAX_RAY_DEPTH_LIMIT: u32 = 1000;

/// Exclusive upper bound on a single render round.
pub const MAX_RENDER_DURATION_MS: u64 = 60_000;

/// Per-session render parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Self-intersection offset and Möller-Trumbore determinant threshold
    pub epsilon: f64,
    /// Maximum number of scattering events per path
    pub max_ray_depth: u32,
    /// Radiance returned by rays that escape the scene
    pub sky: Sky,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            max_ray_depth: DEFAULT_MAX_RAY_DEPTH,
            sky: Sky::default(),
        }
    }
}

impl RenderConfig {
    pub fn with_sky(mut self, sky: Sky) -> Self {
        self.sky = sky;
        self
    }

    pub fn with_max_ray_depth(mut self, max_ray_depth: u32) -> Self {
        self.max_ray_depth = max_ray_depth;
        self
    }
}

/// Environment radiance as a function of ray direction.
#[derive(Debug, Clone, PartialEq)]
pub enum Sky {
    /// The same color in every direction.
    SolidFill(Color),

    /// Moon & Spencer overcast-sky luminance, as cited in Preetham 1999.
    CieOvercast { zenith: Vec3, zenith_luminance: f64 },

    /// Equirectangular RGB float image.
    EnvironmentMap {
        zenith: Vec3,
        width: usize,
        height: usize,
        pixels: Arc<[f32]>,
    },
}

impl Default for Sky {
    fn default() -> Self {
        Sky::SolidFill(Color::BLACK)
    }
}

impl Sky {
    /// Sky radiance seen along `direction` (expected to be unit length).
    pub fn color(&self, direction: Vec3) -> Color {
        match self {
            Sky::SolidFill(color) => *color,
            Sky::CieOvercast {
                zenith,
                zenith_luminance,
            } => {
                let theta = 1.0 - zenith.dot(direction);
                Color::splat(zenith_luminance * ((1.0 + 2.0 * theta.cos()) / 3.0))
            }
            Sky::EnvironmentMap {
                zenith,
                width,
                height,
                pixels,
            } => {
                if *width == 0 || *height == 0 {
                    return Color::BLACK;
                }

                let d = direction.normalized();
                let (u, v) = if zenith.y != 0.0 {
                    (
                        0.5 + d.x.atan2(d.z) / (2.0 * PI),
                        0.5 - d.y.clamp(-1.0, 1.0).asin() / PI,
                    )
                } else {
                    (
                        0.5 + d.x.atan2(d.y) / (2.0 * PI),
                        0.5 - (-d.z).clamp(-1.0, 1.0).asin() / PI,
                    )
                };

                let px = ((*width as f64 * u) as usize).min(width - 1);
                let py = ((*height as f64 * v) as usize).min(height - 1);
                let idx = (px + py * width) * 3;

                match pixels.get(idx..idx + 3) {
                    Some(rgb) => Color::new(rgb[0] as f64, rgb[1] as f64, rgb[2] as f64),
                    None => Color::BLACK,
                }
            }
        }
    }
}

/// Check a requested render duration against `(0, MAX_RENDER_DURATION_MS)`.
pub fn validate_render_duration(duration_ms: u64) -> RenderResult<Duration> {
    if duration_ms == 0 || duration_ms >= MAX_RENDER_DURATION_MS {
        return Err(RenderError::Bounds(duration_ms));
    }
    Ok(Duration::from_millis(duration_ms))
}
