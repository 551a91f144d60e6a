//! Wray Core - scene description, render configuration and errors.
//!
//! This crate provides:
//!
//! - **Scene input**: `SceneSettings`, the serde schema a scene file is
//!   deserialized into before any rendering happens
//! - **Render configuration**: `RenderConfig` and the `Sky` models
//! - **Errors**: the `RenderError` taxonomy shared by renderer and marshal
//!
//! # Example
//!
//! ```ignore
//! use wray_core::SceneSettings;
//!
//! let scene = SceneSettings::load("monkey.wray-scene.json")?;
//! let config = scene.render_config();
//! println!("{} triangles, max depth {}", scene.triangles.len(), config.max_ray_depth);
//! ```

pub mod config;
pub mod error;
pub mod scene;

// Re-export commonly used types
pub use config::{
    validate_render_duration, RenderConfig, Sky, DEFAULT_EPSILON, DEFAULT_MAX_RAY_DEPTH,
    MAX_RAY_DEPTH_LIMIT, MAX_RENDER_DURATION_MS,
};
pub use error::{RenderError, RenderResult, SceneError};
pub use scene::{
    hardware_concurrency, AxisAngle, CameraSettings, MaterialSettings, Point3,
    RenderThreadCount, Resolution, SceneSettings, SkySettings, TriangleSettings, VertexSettings,
};
