//! Pinhole camera for primary ray generation.

use std::f64::consts::PI;

use rand::{Rng, RngCore};
use wray_core::{CameraSettings, RenderError, RenderResult, Resolution};
use wray_math::{Mat4, Vec3, Vec3Ext};

use crate::Ray;

/// Camera looking down its local -Z, oriented by an axis-angle rotation.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    rotation: Mat4,
    /// tan of the fov angle, which spans the center-to-top half of the view
    tan_fov: f64,
    antialiasing: bool,
    width: usize,
    height: usize,
}

impl Camera {
    /// Create a camera for a `width`×`height` viewing plane.
    ///
    /// `fov` is in degrees and must lie in (0, 90). A zero `axis` is only
    /// allowed together with a zero `angle`.
    pub fn new(
        position: Vec3,
        axis: Vec3,
        angle: f64,
        fov: f64,
        antialiasing: bool,
        width: usize,
        height: usize,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::Configuration(format!(
                "invalid viewing plane {width}x{height}"
            )));
        }
        if !(fov > 0.0 && fov < 90.0) {
            return Err(RenderError::Configuration(format!(
                "camera fov {fov} is outside (0, 90) degrees"
            )));
        }

        let axis = axis.normalized();
        let rotation = if angle == 0.0 {
            Mat4::IDENTITY
        } else if axis.length_squared() == 0.0 {
            return Err(RenderError::Configuration(
                "camera rotation axis is zero but the angle is not".into(),
            ));
        } else {
            Mat4::from_axis_angle(axis, angle)
        };

        Ok(Self {
            position,
            rotation,
            tan_fov: (fov * PI / 180.0).tan(),
            antialiasing,
            width,
            height,
        })
    }

    pub fn from_settings(settings: &CameraSettings, resolution: Resolution) -> RenderResult<Self> {
        Self::new(
            settings.position.into(),
            settings.axis_angle.axis(),
            settings.axis_angle.angle(),
            settings.fov,
            settings.antialiasing,
            resolution.width as usize,
            resolution.height as usize,
        )
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Viewing plane size in pixels.
    pub fn viewport(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Normalized ray from the camera through pixel `(x, y)`.
    ///
    /// `(0, 0)` is the top-left pixel. With antialiasing the sample point is
    /// jittered around the pixel center with a Gaussian-like falloff.
    pub fn ray_toward_viewing_plane(&self, x: usize, y: usize, rng: &mut dyn RngCore) -> Ray {
        let (dx, dy) = if self.antialiasing {
            let r1: f64 = rng.gen();
            let r2: f64 = rng.gen();
            let radius = 0.49 * (-(1.0 - r1).ln()).sqrt();
            let theta = 2.0 * PI * r2;
            (radius * theta.cos(), radius * theta.sin())
        } else {
            (0.0, 0.0)
        };

        let aspect = self.width as f64 / self.height as f64;
        let px = (x as f64 + 0.5 + dx) / self.width as f64;
        let py = (y as f64 + 0.5 + dy) / self.height as f64;

        let direction = Vec3::new(
            (2.0 * px - 1.0) * self.tan_fov * aspect,
            (1.0 - 2.0 * py) * self.tan_fov,
            -1.0,
        );

        Ray::normalized(self.position, direction.rotated_by_matrix(&self.rotation))
    }
}
