//! Drape texture strategies.
//!
//! The payload selects one of three mutually exclusive texture modes:
//! no `image_url` means a procedurally shaded relief image, a bare
//! `image_url` drapes the image across the full plane, and an
//! `image_url` with UV parameters aligns the image to the terrain's
//! geographic bounds via repeat/offset.

use std::sync::mpsc;
use std::thread;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use image::{Rgba, RgbaImage};
use rand::Rng;

use super::TerrainGrid;
use crate::response::TerrainResponse;

/// Upscale factor applied to the procedural relief image.
const UPSCALE: u32 = 4;

/// UV repeat/offset applied when sampling the drape texture, laid out
/// for direct upload as a uniform.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct UvTransform {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

impl UvTransform {
    pub const IDENTITY: Self = Self {
        scale: [1.0, 1.0],
        offset: [0.0, 0.0],
    };
}

impl Default for UvTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// How the ground mesh gets its texture.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureStrategy {
    /// Synthesized relief shading from the elevation grid.
    Procedural,
    /// An external image draped edge-to-edge.
    Direct { source: String },
    /// An external image aligned to geographic bounds.
    Aligned {
        source: String,
        transform: UvTransform,
    },
}

impl TextureStrategy {
    /// Pick the strategy from which payload fields are present.
    pub fn from_response(response: &TerrainResponse) -> Self {
        let Some(source) = response.image_url.clone() else {
            return TextureStrategy::Procedural;
        };

        let has_uv = response.tex_scale_x.is_some()
            || response.tex_scale_y.is_some()
            || response.tex_shift_x.is_some()
            || response.tex_shift_y.is_some();
        if !has_uv {
            return TextureStrategy::Direct { source };
        }

        TextureStrategy::Aligned {
            source,
            transform: UvTransform {
                scale: [
                    response.tex_scale_x.unwrap_or(1.0),
                    response.tex_scale_y.unwrap_or(1.0),
                ],
                offset: [
                    response.tex_shift_x.unwrap_or(0.0),
                    response.tex_shift_y.unwrap_or(0.0),
                ],
            },
        }
    }

    /// The transform fed to the sampler; identity except when aligned.
    pub fn uv_transform(&self) -> UvTransform {
        match self {
            TextureStrategy::Aligned { transform, .. } => *transform,
            _ => UvTransform::IDENTITY,
        }
    }

    /// Image path to load, if this strategy needs one.
    pub fn source(&self) -> Option<&str> {
        match self {
            TextureStrategy::Procedural => None,
            TextureStrategy::Direct { source } => Some(source),
            TextureStrategy::Aligned { source, .. } => Some(source),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TextureStrategy::Procedural => "procedural relief",
            TextureStrategy::Direct { .. } => "image",
            TextureStrategy::Aligned { .. } => "aligned image",
        }
    }
}

/// Synthesize the height-tinted hillshade image for `grid`, upscaled
/// 4x with bilinear resampling and dithered to hide banding.
///
/// Each sample's normal comes from the elevation difference two cells
/// away along each axis (clamped at the borders), lit by a fixed sun
/// from (1, 1, 1). The dither adds an independent uniform value in
/// `[0, 5)` to every channel of every pixel, so output is only
/// reproducible under a seeded `rng`.
pub fn shaded_texture<R: Rng>(grid: &TerrainGrid, rng: &mut R) -> RgbaImage {
    let sun = Vec3::new(1.0, 1.0, 1.0).normalize();

    let base = RgbaImage::from_fn(grid.nx, grid.ny, |i, j| {
        let (i, j) = (i as i64, j as i64);
        let normal = Vec3::new(
            grid.elevation_clamped(i - 2, j) - grid.elevation_clamped(i + 2, j),
            2.0,
            grid.elevation_clamped(i, j - 2) - grid.elevation_clamped(i, j + 2),
        )
        .normalize();
        let shade = normal.dot(sun);
        let h = grid.elevation_clamped(i, j);

        let tint = 0.5 + h * 0.007;
        let r = (96.0 + shade * 128.0) * tint;
        let g = (32.0 + shade * 96.0) * tint;
        let b = (shade * 96.0) * tint;

        Rgba([channel(r), channel(g), channel(b), 255])
    });

    let mut upscaled = image::imageops::resize(
        &base,
        grid.nx * UPSCALE,
        grid.ny * UPSCALE,
        image::imageops::FilterType::Triangle,
    );

    for pixel in upscaled.pixels_mut() {
        for c in 0..3 {
            pixel[c] = pixel[c].saturating_add(rng.random_range(0..5u8));
        }
    }

    upscaled
}

fn channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// 1x1 white placeholder bound until a real image arrives (or forever,
/// when the load fails).
pub fn blank_texture() -> RgbaImage {
    RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]))
}

/// An image decode running on a background thread.
///
/// The view polls once per frame; the generation tag lets it discard a
/// delivery that outlived its scene.
pub struct PendingTexture {
    pub generation: u64,
    receiver: mpsc::Receiver<Result<RgbaImage, image::ImageError>>,
}

impl PendingTexture {
    pub fn spawn(source: String, generation: u64) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let result = image::open(&source).map(|img| img.to_rgba8());
            // The view may have dropped the receiver; nothing to do then.
            let _ = sender.send(result);
        });
        Self {
            generation,
            receiver,
        }
    }

    /// Non-blocking check for the decode result. `None` while still
    /// loading or after the result was already taken.
    pub fn poll(&self) -> Option<Result<RgbaImage, image::ImageError>> {
        self.receiver.try_recv().ok()
    }
}
