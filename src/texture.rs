use crate::direction::CubeFace;
use anyhow::{bail, Context, Result};
use glam::{UVec2, Vec2, Vec3};
use image::{DynamicImage, ImageReader};
use std::path::Path;

/// One HDR RGB face of an environment capture, rows stored top to bottom.
#[derive(Clone, Debug)]
pub struct FaceTexture {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl FaceTexture {
    pub fn new(width: u32, height: u32, pixels: Vec<Vec3>) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("Face texture dimensions must be non-zero (got {width}x{height})");
        }
        let expected = (width as usize) * (height as usize);
        if pixels.len() != expected {
            bail!("Face texture {width}x{height} expects {expected} texels, got {}", pixels.len());
        }
        Ok(Self { width, height, pixels })
    }

    pub fn uniform(width: u32, height: u32, color: Vec3) -> Self {
        let count = (width as usize) * (height as usize);
        Self { width, height, pixels: vec![color; count] }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Vec3) -> Self {
        let mut pixels = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self { width, height, pixels }
    }

    /// Fills a square face from a radiance function of direction, using the cube layout of `face`.
    pub fn from_radiance(face: CubeFace, size: u32, radiance: impl Fn(Vec3) -> Vec3) -> Self {
        Self::from_fn(size, size, |x, y| radiance(face.texel_direction(x, y, size)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .with_context(|| format!("opening face image '{}'", path.display()))?
            .with_guessed_format()?;
        let image = reader.decode().with_context(|| format!("decoding face image '{}'", path.display()))?;
        Self::from_image(&image)
    }

    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let rgb = image.to_rgb32f();
        let width = rgb.width();
        let height = rgb.height();
        let pixels = rgb.pixels().map(|pixel| Vec3::from_array(pixel.0)).collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[Vec3] {
        &self.pixels
    }

    /// Texel at `(x, y)` clamped to the edge. An empty face reads as black.
    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        self.pixels.get((y * self.width + x) as usize).copied().unwrap_or(Vec3::ZERO)
    }

    /// Nearest-texel lookup with clamp-to-edge addressing. At texel centers this is exact.
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        let texel = (uv * self.size().as_vec2()).floor();
        let x = texel.x.clamp(0.0, self.width.saturating_sub(1) as f32) as u32;
        let y = texel.y.clamp(0.0, self.height.saturating_sub(1) as f32) as u32;
        self.texel(x, y)
    }

    /// Copy with every texel multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self { width: self.width, height: self.height, pixels: self.pixels.iter().map(|p| *p * factor).collect() }
    }

    /// Interleaved RGBA floats, alpha = 1.
    pub fn to_rgba_f32(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(self.pixels.len() * 4);
        for pixel in &self.pixels {
            data.extend_from_slice(&[pixel.x, pixel.y, pixel.z, 1.0]);
        }
        data
    }
}
