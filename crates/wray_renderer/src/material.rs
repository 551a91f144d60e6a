//! Surface materials and their scattering.
//!
//! Each non-emissive material importance-samples its outgoing direction and
//! folds BRDF/PDF into a scalar weight, so the integrator only multiplies.

use std::f64::consts::PI;

use rand::{Rng, RngCore};
use wray_core::MaterialSettings;
use wray_math::{Color, Vec3, Vec3Ext};

use crate::Ray;

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    /// Ideal diffuse reflector.
    Lambertian { color: Color, albedo: f64 },
    /// Mirror with probability `reflectance`, Lambertian otherwise.
    Reflective {
        color: Color,
        reflectance: f64,
        albedo: f64,
    },
    /// Light source. Radiance is color × intensity. Terminates paths.
    Emissive { radiance: Color },
}

/// Outgoing ray of a scattering event and its BRDF/PDF weight.
#[derive(Debug, Clone, Copy)]
pub struct Scatter {
    pub ray: Ray,
    pub weight: f64,
}

impl Material {
    pub fn lambertian(color: Color, albedo: f64) -> Self {
        Material::Lambertian { color, albedo }
    }

    pub fn reflective(color: Color, reflectance: f64, albedo: f64) -> Self {
        Material::Reflective {
            color,
            reflectance,
            albedo,
        }
    }

    pub fn emissive(color: Color, intensity: f64) -> Self {
        Material::Emissive {
            radiance: color * intensity,
        }
    }

    pub fn from_settings(settings: &MaterialSettings) -> Self {
        match *settings {
            MaterialSettings::Lambertian { color, albedo } => Material::lambertian(color, albedo),
            MaterialSettings::Reflective {
                color,
                reflectance,
                albedo,
            } => Material::reflective(color, reflectance, albedo),
            MaterialSettings::Emissive { color, intensity } => Material::emissive(color, intensity),
        }
    }

    #[inline]
    pub fn is_emissive(&self) -> bool {
        matches!(self, Material::Emissive { .. })
    }

    /// Surface tint for scattering materials, radiance for emitters.
    #[inline]
    pub fn color(&self) -> Color {
        match *self {
            Material::Lambertian { color, .. } | Material::Reflective { color, .. } => color,
            Material::Emissive { radiance } => radiance,
        }
    }

    /// Scatter a ray arriving at a surface point with the given shading normal.
    ///
    /// `ray_in` must already start at the (offset) hit point. Emissive
    /// materials don't scatter and return `None`.
    pub fn scatter(&self, ray_in: &Ray, normal: Vec3, rng: &mut dyn RngCore) -> Option<Scatter> {
        match *self {
            Material::Lambertian { albedo, .. } => Some(scatter_lambertian(ray_in, normal, albedo, rng)),
            Material::Reflective {
                reflectance,
                albedo,
                ..
            } => {
                if rng.gen::<f64>() <= reflectance {
                    Some(Scatter {
                        ray: Ray::new(ray_in.origin(), reflect(ray_in.direction(), normal)),
                        weight: 1.0,
                    })
                } else {
                    Some(scatter_lambertian(ray_in, normal, albedo, rng))
                }
            }
            Material::Emissive { .. } => None,
        }
    }
}

fn scatter_lambertian(ray_in: &Ray, normal: Vec3, albedo: f64, rng: &mut dyn RngCore) -> Scatter {
    let direction = random_in_hemisphere_cosine_weighted(normal, rng);
    let cos_theta = normal.dot(direction);

    let brdf = cos_theta * (albedo / PI);
    let pdf = cos_theta / PI;
    let weight = if pdf > 0.0 { brdf / pdf } else { 0.0 };

    Scatter {
        ray: Ray::new(ray_in.origin(), direction),
        weight,
    }
}

/// Mirror `direction` about `normal`.
#[inline]
pub fn reflect(direction: Vec3, normal: Vec3) -> Vec3 {
    direction - 2.0 * normal.dot(direction) * normal
}

/// Cosine-weighted random direction in the hemisphere around `normal`.
pub fn random_in_hemisphere_cosine_weighted(normal: Vec3, rng: &mut dyn RngCore) -> Vec3 {
    let r1: f64 = rng.gen();
    let r2: f64 = rng.gen();

    let r = r1.sqrt();
    let theta = 2.0 * PI * r2;
    let x = r * theta.cos();
    let y = (1.0 - r1).max(0.0).sqrt();
    let z = r * theta.sin();

    // Orthonormal basis around the normal
    let t = if normal.x.abs() > normal.y.abs() {
        Vec3::new(normal.z, 0.0, -normal.x).normalized()
    } else {
        Vec3::new(0.0, -normal.z, normal.y).normalized()
    };
    let b = normal.cross(t);

    (x * b + y * normal + z * t).normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn incoming() -> Ray {
        Ray::new(Vec3::new(0.0, 1e-6, 0.0), Vec3::new(1.0, -1.0, 0.0).normalized())
    }

    #[test]
    fn test_cosine_hemisphere_stays_above_surface() {
        let mut rng = StdRng::seed_from_u64(42);
        let normals = [Vec3::Y, Vec3::NEG_X, Vec3::new(1.0, 2.0, 3.0).normalized()];

        for normal in normals {
            for _ in 0..1000 {
                let dir = random_in_hemisphere_cosine_weighted(normal, &mut rng);
                assert!((dir.length() - 1.0).abs() < 1e-9);
                assert!(dir.dot(normal) >= -1e-12);
            }
        }
    }

    #[test]
    fn test_cosine_hemisphere_mean_cosine() {
        // E[cos θ] for cosine-weighted sampling is 2/3
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mean: f64 = (0..n)
            .map(|_| random_in_hemisphere_cosine_weighted(Vec3::Y, &mut rng).y)
            .sum::<f64>()
            / n as f64;

        assert!((mean - 2.0 / 3.0).abs() < 0.01, "mean cosine {mean}");
    }

    #[test]
    fn test_lambertian_weight_is_albedo() {
        let mut rng = StdRng::seed_from_u64(1);
        let material = Material::lambertian(Color::WHITE, 0.7);

        for _ in 0..100 {
            let scatter = material.scatter(&incoming(), Vec3::Y, &mut rng).unwrap();
            assert!((scatter.weight - 0.7).abs() < 1e-12);
            assert_eq!(scatter.ray.origin(), incoming().origin());
        }
    }

    #[test]
    fn test_full_reflectance_mirrors() {
        let mut rng = StdRng::seed_from_u64(3);
        let material = Material::reflective(Color::WHITE, 1.0, 0.7);

        let scatter = material.scatter(&incoming(), Vec3::Y, &mut rng).unwrap();
        let expected = Vec3::new(1.0, 1.0, 0.0).normalized();

        assert_eq!(scatter.weight, 1.0);
        assert!((scatter.ray.direction() - expected).length() < 1e-12);
    }

    #[test]
    fn test_zero_reflectance_is_mostly_diffuse() {
        let mut rng = StdRng::seed_from_u64(5);
        let material = Material::reflective(Color::WHITE, 0.0, 0.5);

        // rand's f64 is in [0, 1), so zero reflectance mirrors only on an exact 0.0 draw
        let diffuse = (0..1000)
            .filter_map(|_| material.scatter(&incoming(), Vec3::Y, &mut rng))
            .filter(|s| (s.weight - 0.5).abs() < 1e-12)
            .count();
        assert!(diffuse >= 999);
    }

    #[test]
    fn test_half_reflectance_mirrors_half_the_time() {
        let mut rng = StdRng::seed_from_u64(11);
        let material = Material::reflective(Color::WHITE, 0.5, 0.5);
        let mirror = Vec3::new(1.0, 1.0, 0.0).normalized();

        let n = 4000;
        let mut mirrored = 0;
        for _ in 0..n {
            let scatter = material.scatter(&incoming(), Vec3::Y, &mut rng).unwrap();
            if scatter.weight == 1.0 {
                assert!((scatter.ray.direction() - mirror).length() < 1e-12);
                mirrored += 1;
            } else {
                assert!((scatter.weight - 0.5).abs() < 1e-12);
            }
        }

        // Mean n/2, standard deviation ~32
        assert!((1800..=2200).contains(&mirrored), "{mirrored} of {n} mirrored");
    }

    #[test]
    fn test_emissive_does_not_scatter() {
        let mut rng = StdRng::seed_from_u64(0);
        let light = Material::emissive(Color::new(1.0, 0.5, 0.25), 2.0);

        assert!(light.is_emissive());
        assert_eq!(light.color(), Color::new(2.0, 1.0, 0.5));
        assert!(light.scatter(&incoming(), Vec3::Y, &mut rng).is_none());
    }

    #[test]
    fn test_from_settings() {
        let settings = MaterialSettings::Emissive {
            color: Color::WHITE,
            intensity: 3.0,
        };
        assert_eq!(
            Material::from_settings(&settings),
            Material::Emissive {
                radiance: Color::splat(3.0)
            }
        );
    }
}
