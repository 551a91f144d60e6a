//! Scene input schema.
//!
//! A scene arrives as JSON shaped like this (all names camelCase):
//!
//! ```json
//! {
//!   "triangles": [{"vertices": [{"position": {"x":0,"y":0,"z":0}, "normal": null}, ...], "material": "floor"}],
//!   "materials": {"floor": {"type": "lambertian", "color": {"r":1,"g":1,"b":1}, "albedo": 0.7}},
//!   "camera": {"position": {...}, "axisAngle": {"x":0,"y":1,"z":0,"w":0}, "fov": 17, "antialiasing": true},
//!   "outputResolution": {"width": 640, "height": 360},
//!   "renderThreadCount": "all",
//!   "maxRayDepth": 10,
//!   "epsilon": 0.000001,
//!   "sky": {"model": "solid-fill", "fillColor": {"r":0,"g":0,"b":0}}
//! }
//! ```
//!
//! Deserialization is purely declarative; nothing in a scene file is ever
//! evaluated as code.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wray_math::{Color, Vec3};

use crate::config::{
    RenderConfig, Sky, DEFAULT_EPSILON, DEFAULT_MAX_RAY_DEPTH, MAX_RAY_DEPTH_LIMIT,
};
use crate::error::{RenderError, RenderResult, SceneError};

/// Plain `{x, y, z}` triple as it appears in scene files.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Vec3 {
        Vec3::new(p.x, p.y, p.z)
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Point3 {
        Point3::new(v.x, v.y, v.z)
    }
}

/// Rotation axis `(x, y, z)` and angle `w` in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisAngle {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl AxisAngle {
    pub fn axis(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn angle(&self) -> f64 {
        self.w
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    pub position: Point3,
    #[serde(default)]
    pub axis_angle: AxisAngle,
    /// Field of view in degrees
    pub fov: f64,
    #[serde(default)]
    pub antialiasing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexSettings {
    pub position: Point3,
    #[serde(default)]
    pub normal: Option<Point3>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleSettings {
    pub vertices: Vec<VertexSettings>,
    pub material: String,
}

fn default_albedo() -> f64 {
    0.7
}

fn default_one() -> f64 {
    1.0
}

/// Material description, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MaterialSettings {
    Lambertian {
        color: Color,
        #[serde(default = "default_albedo")]
        albedo: f64,
    },
    Reflective {
        color: Color,
        #[serde(default = "default_one")]
        reflectance: f64,
        #[serde(default = "default_albedo")]
        albedo: f64,
    },
    Emissive {
        color: Color,
        #[serde(default = "default_one")]
        intensity: f64,
    },
}

fn default_zenith() -> Point3 {
    Point3::new(0.0, 1.0, 0.0)
}

fn default_environment_zenith() -> Point3 {
    Point3::new(0.0, 0.0, 1.0)
}

fn default_zenith_luminance() -> f64 {
    1.3
}

/// Sky model description, tagged by `"model"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "kebab-case")]
pub enum SkySettings {
    SolidFill {
        #[serde(rename = "fillColor", default)]
        fill_color: Color,
    },
    CieOvercast {
        #[serde(rename = "zenithDirection", default = "default_zenith")]
        zenith_direction: Point3,
        #[serde(rename = "zenithLuminance", default = "default_zenith_luminance")]
        zenith_luminance: f64,
    },
    EnvironmentMap {
        #[serde(rename = "zenithDirection", default = "default_environment_zenith")]
        zenith_direction: Point3,
        width: usize,
        height: usize,
        pixels: Vec<f32>,
    },
}

impl SkySettings {
    fn to_sky(&self) -> Sky {
        match self {
            SkySettings::SolidFill { fill_color } => Sky::SolidFill(*fill_color),
            SkySettings::CieOvercast {
                zenith_direction,
                zenith_luminance,
            } => Sky::CieOvercast {
                zenith: (*zenith_direction).into(),
                zenith_luminance: *zenith_luminance,
            },
            SkySettings::EnvironmentMap {
                zenith_direction,
                width,
                height,
                pixels,
            } => Sky::EnvironmentMap {
                zenith: (*zenith_direction).into(),
                width: *width,
                height: *height,
                pixels: Arc::from(pixels.as_slice()),
            },
        }
    }

    fn validate(&self) -> RenderResult<()> {
        match self {
            SkySettings::SolidFill { fill_color } => check_color("sky fill color", fill_color),
            SkySettings::CieOvercast {
                zenith_direction,
                zenith_luminance,
            } => {
                if !zenith_direction.is_finite() {
                    return config_err("sky zenith direction must be finite");
                }
                if !(zenith_luminance.is_finite() && *zenith_luminance >= 0.0) {
                    return config_err("sky zenith luminance must be a non-negative number");
                }
                Ok(())
            }
            SkySettings::EnvironmentMap {
                width,
                height,
                pixels,
                ..
            } => {
                if *width == 0 || *height == 0 {
                    return config_err("environment map must not be empty");
                }
                if pixels.len() != width * height * 3 {
                    return config_err(format!(
                        "environment map has {} values, expected {}x{}x3",
                        pixels.len(),
                        width,
                        height
                    ));
                }
                if pixels.iter().any(|p| !(p.is_finite() && *p >= 0.0)) {
                    return config_err("environment map pixels must be finite and non-negative");
                }
                Ok(())
            }
        }
    }
}

/// Number of render workers to spawn: an explicit count, `"all"` or `"half"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RenderThreadCount {
    Count(i64),
    Keyword(String),
}

impl RenderThreadCount {
    /// Resolve against the machine's hardware concurrency. Always at least 1.
    pub fn resolve(&self, hardware: usize) -> RenderResult<usize> {
        let hardware = hardware.max(1);
        let count = match self {
            RenderThreadCount::Count(n) => *n,
            RenderThreadCount::Keyword(keyword) => match keyword.trim().to_lowercase().as_str() {
                "all" => return Ok(hardware),
                "half" => return Ok((hardware / 2).max(1)),
                other => other.parse::<i64>().map_err(|_| {
                    RenderError::Configuration(format!("unknown render thread count \"{keyword}\""))
                })?,
            },
        };

        if count < 1 {
            return config_err(format!("render thread count must be positive, got {count}"));
        }
        usize::try_from(count)
            .map_err(|_| RenderError::Configuration(format!("render thread count {count} is too large")))
    }
}

/// Number of hardware threads, falling back to 4 when it can't be queried.
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Everything the marshal needs to set up a render session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSettings {
    #[serde(default)]
    pub triangles: Vec<TriangleSettings>,
    #[serde(default)]
    pub materials: BTreeMap<String, MaterialSettings>,
    #[serde(default)]
    pub camera: Option<CameraSettings>,
    #[serde(default)]
    pub output_resolution: Option<Resolution>,
    #[serde(default)]
    pub render_thread_count: Option<RenderThreadCount>,
    #[serde(default)]
    pub max_ray_depth: Option<u32>,
    #[serde(default)]
    pub epsilon: Option<f64>,
    #[serde(default)]
    pub sky: Option<SkySettings>,
}

impl SceneSettings {
    /// Parse a scene from a JSON string. Does not validate.
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a scene from any reader. Does not validate.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SceneError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read, parse and validate a scene file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let scene = Self::from_reader(std::io::BufReader::new(file))?;
        scene.validate()?;

        log::info!(
            "Loaded scene {:?}: {} triangles, {} materials",
            path,
            scene.triangles.len(),
            scene.materials.len()
        );
        Ok(scene)
    }

    /// Output resolution, or a configuration error if absent or zero-sized.
    pub fn resolution(&self) -> RenderResult<Resolution> {
        let resolution = self
            .output_resolution
            .ok_or_else(|| RenderError::Configuration("no render resolution specified".into()))?;
        if resolution.width == 0 || resolution.height == 0 {
            return config_err(format!(
                "invalid render resolution {}x{}",
                resolution.width, resolution.height
            ));
        }
        Ok(resolution)
    }

    /// Camera settings, or a configuration error if absent or malformed.
    pub fn camera(&self) -> RenderResult<&CameraSettings> {
        let camera = self
            .camera
            .as_ref()
            .ok_or_else(|| RenderError::Configuration("no camera specified".into()))?;

        if !camera.position.is_finite() {
            return config_err("camera position must be finite");
        }
        let axis_angle = camera.axis_angle;
        if !(axis_angle.axis().is_finite() && axis_angle.w.is_finite()) {
            return config_err("camera axis-angle must be finite");
        }
        if axis_angle.w != 0.0 && axis_angle.axis().length_squared() == 0.0 {
            return config_err("camera rotation axis is zero but the angle is not");
        }
        if !(camera.fov > 0.0 && camera.fov < 90.0) {
            return config_err(format!("camera fov {} is outside (0, 90) degrees", camera.fov));
        }
        Ok(camera)
    }

    /// Resolved worker count for the given hardware concurrency.
    pub fn worker_count(&self, hardware: usize) -> RenderResult<usize> {
        self.render_thread_count
            .as_ref()
            .ok_or_else(|| RenderError::Configuration("missing the thread count for rendering".into()))?
            .resolve(hardware)
    }

    /// Render parameters with defaults filled in.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            epsilon: self.epsilon.unwrap_or(DEFAULT_EPSILON),
            max_ray_depth: self.max_ray_depth.unwrap_or(DEFAULT_MAX_RAY_DEPTH),
            sky: self.sky.as_ref().map(SkySettings::to_sky).unwrap_or_default(),
        }
    }

    /// Check every field the renderer depends on.
    ///
    /// Geometry problems are reported as [`RenderError::Geometry`], everything
    /// else as [`RenderError::Configuration`].
    pub fn validate(&self) -> RenderResult<()> {
        self.resolution()?;
        self.camera()?;
        self.worker_count(hardware_concurrency())?;

        if let Some(depth) = self.max_ray_depth {
            if depth > MAX_RAY_DEPTH_LIMIT {
                return config_err(format!(
                    "max ray depth must be at most {MAX_RAY_DEPTH_LIMIT}, got {depth}"
                ));
            }
        }
        if let Some(epsilon) = self.epsilon {
            if !(epsilon.is_finite() && epsilon > 0.0) {
                return config_err(format!("epsilon must be a positive number, got {epsilon}"));
            }
        }
        if let Some(sky) = &self.sky {
            sky.validate()?;
        }

        for (name, material) in &self.materials {
            validate_material(name, material)?;
        }

        for (i, triangle) in self.triangles.iter().enumerate() {
            if triangle.vertices.len() != 3 {
                return Err(RenderError::Geometry(format!(
                    "triangle {i} has {} vertices, expected 3",
                    triangle.vertices.len()
                )));
            }
            let finite = triangle.vertices.iter().all(|v| {
                v.position.is_finite() && v.normal.map_or(true, |n| n.is_finite())
            });
            if !finite {
                return Err(RenderError::Geometry(format!(
                    "triangle {i} has non-finite vertex data"
                )));
            }
            if !self.materials.contains_key(&triangle.material) {
                return config_err(format!(
                    "triangle {i} uses unknown material \"{}\"",
                    triangle.material
                ));
            }
        }

        Ok(())
    }
}

fn validate_material(name: &str, material: &MaterialSettings) -> RenderResult<()> {
    let (color, label, value) = match material {
        MaterialSettings::Lambertian { color, albedo } => (color, "albedo", *albedo),
        MaterialSettings::Reflective {
            color,
            reflectance,
            albedo,
        } => {
            if !(0.0..=1.0).contains(reflectance) {
                return config_err(format!(
                    "material \"{name}\": reflectance {reflectance} is outside [0, 1]"
                ));
            }
            (color, "albedo", *albedo)
        }
        MaterialSettings::Emissive { color, intensity } => (color, "intensity", *intensity),
    };

    check_color(&format!("material \"{name}\" color"), color)?;
    if !(value.is_finite() && value >= 0.0) {
        return config_err(format!(
            "material \"{name}\": {label} must be a non-negative number, got {value}"
        ));
    }
    Ok(())
}

fn check_color(label: &str, color: &Color) -> RenderResult<()> {
    if !color.is_finite() || color.has_negative() {
        return config_err(format!("{label} must be finite and non-negative"));
    }
    Ok(())
}

fn config_err<T>(reason: impl Into<String>) -> RenderResult<T> {
    Err(RenderError::Configuration(reason.into()))
}
