//! Sample accumulation surface.
//!
//! Each pixel keeps a running color sum and a sample count; averages are only
//! computed when read. Workers accumulate into private surfaces that the
//! marshal later merges.

use rayon::prelude::*;
use wray_core::{RenderError, RenderResult};
use wray_math::Color;

/// Accumulated samples of one pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelSample {
    pub sum: Color,
    pub sample_count: u32,
}

impl PixelSample {
    /// Mean of the accumulated samples; black before the first sample.
    #[inline]
    pub fn average(&self) -> Color {
        self.sum / f64::from(self.sample_count.max(1))
    }
}

/// Raw sums and counts of a surface, as passed from a worker to the marshal.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceBuffer {
    pub width: usize,
    pub height: usize,
    /// Row-major, top row first
    pub pixels: Vec<PixelSample>,
}

/// Fixed-size accumulation buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    width: usize,
    height: usize,
    pixels: Vec<PixelSample>,
}

impl Surface {
    /// An all-zero surface. Both dimensions must be positive.
    pub fn new(width: usize, height: usize) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::Configuration(format!(
                "invalid render surface size {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: vec![PixelSample::default(); width * height],
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of range");
        x + y * self.width
    }

    pub fn pixel(&self, x: usize, y: usize) -> &PixelSample {
        &self.pixels[self.index(x, y)]
    }

    /// Add one sample to pixel `(x, y)`.
    #[inline]
    pub fn accumulate(&mut self, x: usize, y: usize, color: Color) {
        let idx = self.index(x, y);
        let pixel = &mut self.pixels[idx];
        pixel.sum += color;
        pixel.sample_count += 1;
    }

    /// Mean color of pixel `(x, y)`.
    pub fn average(&self, x: usize, y: usize) -> Color {
        self.pixel(x, y).average()
    }

    /// Reset every pixel to zero samples.
    pub fn wipe(&mut self) {
        self.pixels.fill(PixelSample::default());
    }

    /// Collapse each pixel to its current average, counted as a single sample.
    pub fn flatten(&mut self) {
        for pixel in &mut self.pixels {
            *pixel = PixelSample {
                sum: pixel.average(),
                sample_count: 1,
            };
        }
    }

    /// Add another surface's raw sums and counts into this one.
    pub fn merge(&mut self, other: &Surface) -> RenderResult<()> {
        if (self.width, self.height) != (other.width, other.height) {
            return Err(RenderError::Configuration(format!(
                "cannot merge a {}x{} surface into a {}x{} one",
                other.width, other.height, self.width, self.height
            )));
        }

        self.pixels
            .par_iter_mut()
            .zip(other.pixels.par_iter())
            .for_each(|(dst, src)| {
                dst.sum += src.sum;
                dst.sample_count += src.sample_count;
            });
        Ok(())
    }

    /// Median per-pixel sample count.
    pub fn median_sample_count(&self) -> u32 {
        let mut counts: Vec<u32> = self.pixels.iter().map(|p| p.sample_count).collect();
        counts.sort_unstable();
        counts[counts.len() / 2]
    }

    /// Total samples taken across all pixels.
    pub fn total_sample_count(&self) -> u64 {
        self.pixels.iter().map(|p| u64::from(p.sample_count)).sum()
    }

    pub fn to_raw(&self) -> SurfaceBuffer {
        SurfaceBuffer {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }

    pub fn from_raw(buffer: SurfaceBuffer) -> RenderResult<Self> {
        let expected = buffer.width * buffer.height;
        if expected == 0 || buffer.pixels.len() != expected {
            return Err(RenderError::Configuration(format!(
                "render buffer has {} pixels, expected {}x{}",
                buffer.pixels.len(),
                buffer.width,
                buffer.height
            )));
        }
        Ok(Self {
            width: buffer.width,
            height: buffer.height,
            pixels: buffer.pixels,
        })
    }

    /// Pixel averages as row-major RGBA (alpha = 1), top row first.
    pub fn to_buffer(&self) -> Vec<f64> {
        let rgba: Vec<[f64; 4]> = self
            .pixels
            .iter()
            .map(|p| {
                let c = p.average();
                [c.r, c.g, c.b, 1.0]
            })
            .collect();
        bytemuck::cast_slice(&rgba).to_vec()
    }

    /// Pixel averages as RGB f32 rows ordered bottom to top, the layout HDR
    /// image files store.
    pub fn to_hdr_rows(&self) -> Vec<f32> {
        let rgb: Vec<[f32; 3]> = self
            .pixels
            .chunks_exact(self.width)
            .rev()
            .flatten()
            .map(|p| {
                let c = p.average();
                [c.r as f32, c.g as f32, c.b as f32]
            })
            .collect();
        bytemuck::cast_slice(&rgb).to_vec()
    }

    /// Inverse of [`Surface::to_hdr_rows`]; every pixel holds one sample.
    pub fn from_hdr_rows(width: usize, height: usize, data: &[f32]) -> RenderResult<Self> {
        let mut surface = Self::new(width, height)?;

        let rgb: &[[f32; 3]] = bytemuck::try_cast_slice(data).map_err(|e| {
            RenderError::Configuration(format!("HDR pixel data is not RGB triples: {e}"))
        })?;
        if rgb.len() != width * height {
            return Err(RenderError::Configuration(format!(
                "HDR pixel data has {} pixels, expected {width}x{height}",
                rgb.len()
            )));
        }

        for (row, src) in surface
            .pixels
            .chunks_exact_mut(width)
            .zip(rgb.chunks_exact(width).rev())
        {
            for (pixel, &[r, g, b]) in row.iter_mut().zip(src) {
                *pixel = PixelSample {
                    sum: Color::new(f64::from(r), f64::from(g), f64::from(b)),
                    sample_count: 1,
                };
            }
        }
        Ok(surface)
    }
}
