//! Render-ready scene built from [`SceneSettings`].

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::RngCore;
use wray_core::{RenderConfig, RenderError, RenderResult, SceneSettings};
use wray_math::Color;

use crate::{renderer, Bvh, Camera, Material, Triangle, Vertex};

/// Everything a worker needs to trace: BVH, camera and render parameters.
#[derive(Debug)]
pub struct RenderScene {
    bvh: Bvh,
    camera: Camera,
    config: RenderConfig,
}

impl RenderScene {
    pub fn new(bvh: Bvh, camera: Camera, config: RenderConfig) -> Self {
        Self { bvh, camera, config }
    }

    /// Validate the settings, resolve materials and build the BVH.
    pub fn from_settings(settings: &SceneSettings, rng: &mut dyn RngCore) -> RenderResult<Self> {
        settings.validate()?;

        let camera = Camera::from_settings(settings.camera()?, settings.resolution()?)?;

        let materials: BTreeMap<&str, Arc<Material>> = settings
            .materials
            .iter()
            .map(|(name, m)| (name.as_str(), Arc::new(Material::from_settings(m))))
            .collect();

        let triangles = settings
            .triangles
            .iter()
            .map(|tri| {
                let material = materials.get(tri.material.as_str()).ok_or_else(|| {
                    RenderError::Configuration(format!("unknown material \"{}\"", tri.material))
                })?;
                let vertices: Vec<Vertex> = tri
                    .vertices
                    .iter()
                    .map(|v| Vertex {
                        position: v.position.into(),
                        normal: v.normal.map(Into::into),
                    })
                    .collect();
                Triangle::new(&vertices, Arc::clone(material))
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let bvh = Bvh::build(triangles, rng)?;

        Ok(Self::new(bvh, camera, settings.render_config()))
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// One path sample through pixel `(x, y)`.
    pub fn sample_pixel(&self, x: usize, y: usize, rng: &mut dyn RngCore) -> Color {
        renderer::sample_pixel(&self.camera, &self.bvh, x, y, &self.config, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    use crate::Surface;

    /// Emissive white triangle covering the lower-left half of the view.
    const SCENE: &str = r#"{
        "triangles": [{
            "vertices": [
                {"position": {"x": -10, "y": -10, "z": -5}},
                {"position": {"x": 10, "y": -10, "z": -5}},
                {"position": {"x": -10, "y": 10, "z": -5}}
            ],
            "material": "light"
        }],
        "materials": {"light": {"type": "emissive", "color": {"r": 1, "g": 1, "b": 1}}},
        "camera": {"position": {"x": 0, "y": 0, "z": 0}, "axisAngle": {"x": 0, "y": 1, "z": 0, "w": 0}, "fov": 20, "antialiasing": true},
        "outputResolution": {"width": 16, "height": 16},
        "renderThreadCount": 1,
        "maxRayDepth": 1,
        "sky": {"model": "solid-fill", "fillColor": {"r": 0.1, "g": 0.2, "b": 0.3}}
    }"#;

    fn scene(rng: &mut StdRng) -> RenderScene {
        let settings = SceneSettings::from_json(SCENE).unwrap();
        RenderScene::from_settings(&settings, rng).unwrap()
    }

    #[test]
    fn test_emissive_triangle_end_to_end() {
        let mut rng = StdRng::seed_from_u64(12);
        let scene = scene(&mut rng);
        let mut surface = Surface::new(16, 16).unwrap();

        for _ in 0..64 {
            surface.accumulate(0, 15, scene.sample_pixel(0, 15, &mut rng));
            surface.accumulate(2, 12, scene.sample_pixel(2, 12, &mut rng));
            surface.accumulate(15, 0, scene.sample_pixel(15, 0, &mut rng));
        }

        assert_eq!(surface.average(0, 15), Color::WHITE);
        assert_eq!(surface.average(2, 12), Color::WHITE);
        assert_eq!(surface.average(15, 0), Color::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_timed_round_end_to_end() {
        let mut rng = StdRng::seed_from_u64(13);
        let scene = scene(&mut rng);
        let mut surface = Surface::new(16, 16).unwrap();

        let stats = renderer::render_for(
            scene.camera(),
            scene.bvh(),
            scene.config(),
            &mut surface,
            Duration::from_millis(30),
            &mut rng,
        );
        assert!(stats.samples > 0);

        let sky = Color::new(0.1, 0.2, 0.3);
        for y in 0..16 {
            for x in 0..16 {
                if surface.pixel(x, y).sample_count == 0 {
                    continue;
                }
                let color = surface.average(x, y);
                // Every sample is either the light or the sky
                assert!(color.r >= sky.r - 1e-12 && color.r <= 1.0 + 1e-12, "{color:?}");
            }
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut settings = SceneSettings::from_json(SCENE).unwrap();
        settings.triangles[0].vertices.truncate(2);

        let result = RenderScene::from_settings(&settings, &mut rng);
        assert!(matches!(result, Err(RenderError::Geometry(_))));
    }
}
