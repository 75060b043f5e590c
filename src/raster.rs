//! Rotated-signature rasterization with a per-run cache.
//!
//! Cache keys are `(variant_id, rotation_deg)`. Rotations are whole degrees,
//! so a run with many markers collapses onto a small set of rendered
//! bitmaps; that collision rate, not compression, is what bounds the output
//! file size. The cache lives for one reconstruction run and is dropped with
//! it — rotations are re-rolled each run, so cross-run reuse would almost
//! never hit.

use std::collections::HashMap;
use std::io::Cursor;

use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, warn};

use crate::options::EngineOptions;
use crate::types::SignatureAsset;

/// A rendered signature bitmap, PNG-encoded.
#[derive(Debug, Clone)]
pub struct RenderedBitmap {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Result of rendering one `(variant, rotation)` pair.
///
/// `Unavailable` is cached like a success so a corrupt asset costs one
/// decode attempt per run, not one per marker.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Bitmap(RenderedBitmap),
    Unavailable,
}

/// Per-run memoized rasterizer.
#[derive(Default)]
pub struct RasterCache {
    entries: HashMap<(String, i32), RenderOutcome>,
    hits: usize,
    misses: usize,
}

const UNAVAILABLE: RenderOutcome = RenderOutcome::Unavailable;

impl RasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or render the bitmap for an asset at a whole-degree rotation.
    ///
    /// Rotation 0 is not special-cased: it goes through the same render and
    /// cache path so behavior stays uniform.
    pub fn get_or_render(
        &mut self,
        asset: &SignatureAsset,
        rotation_deg: i32,
        options: &EngineOptions,
    ) -> &RenderOutcome {
        let key = (asset.variant_id.clone(), rotation_deg);
        if self.entries.contains_key(&key) {
            self.hits += 1;
        } else {
            self.misses += 1;
            let outcome = render(asset, rotation_deg, options);
            if matches!(outcome, RenderOutcome::Unavailable) {
                warn!(
                    variant = %asset.variant_id,
                    rotation_deg, "render failed, marking variant unavailable"
                );
            }
            self.entries.insert(key.clone(), outcome);
        }
        self.entries.get(&key).unwrap_or(&UNAVAILABLE)
    }

    /// (hits, misses) for the run report.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

/// Decode, bound, rotate, and re-encode one signature image.
fn render(asset: &SignatureAsset, rotation_deg: i32, options: &EngineOptions) -> RenderOutcome {
    let Ok(bytes) = asset.source.bytes() else {
        return RenderOutcome::Unavailable;
    };
    let Ok(decoded) = image::load_from_memory(&bytes) else {
        return RenderOutcome::Unavailable;
    };
    drop(bytes);

    // Downscale to the print-quality ceiling. Never upscale.
    let decoded = bound_to_ceiling(decoded, options.raster_ceiling_px);
    let src = decoded.to_rgba8();
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return RenderOutcome::Unavailable;
    }

    let theta = f64::from(rotation_deg).to_radians();
    let (canvas_w, canvas_h) = rotated_canvas_size(w, h, theta);
    if canvas_w > options.max_surface_px || canvas_h > options.max_surface_px {
        return RenderOutcome::Unavailable;
    }

    // Paste onto a transparent canvas big enough for the rotated bounding
    // box, so corners are not clipped by the in-place rotation.
    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));
    let off_x = i64::from((canvas_w - w) / 2);
    let off_y = i64::from((canvas_h - h) / 2);
    image::imageops::overlay(&mut canvas, &src, off_x, off_y);

    #[allow(clippy::cast_possible_truncation)]
    let rotated = rotate_about_center(&canvas, theta as f32, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));

    let mut out = Cursor::new(Vec::new());
    if DynamicImage::ImageRgba8(rotated)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .is_err()
    {
        return RenderOutcome::Unavailable;
    }

    debug!(
        variant = %asset.variant_id,
        rotation_deg, canvas_w, canvas_h, "rendered signature bitmap"
    );
    RenderOutcome::Bitmap(RenderedBitmap {
        png: out.into_inner(),
        width: canvas_w,
        height: canvas_h,
    })
}

/// Shrink so the largest dimension is at most `ceiling`, keeping the ratio.
fn bound_to_ceiling(img: DynamicImage, ceiling: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    if w.max(h) <= ceiling || ceiling == 0 {
        return img;
    }
    // `resize` preserves aspect ratio within the given bounds.
    img.resize(ceiling, ceiling, image::imageops::FilterType::Lanczos3)
}

/// Bounding box of a w*h rectangle rotated by `theta` radians.
fn rotated_canvas_size(w: u32, h: u32, theta: f64) -> (u32, u32) {
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let fw = f64::from(w);
    let fh = f64::from(h);
    (
        f64_to_u32_ceil(fw * cos + fh * sin),
        f64_to_u32_ceil(fw * sin + fh * cos),
    )
}

/// Ceil an f64 into u32 with clamping; values are canvas sizes, never huge.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn f64_to_u32_ceil(v: f64) -> u32 {
    v.ceil().clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{ImageSource, MemorySource, SignatureAsset};
    use std::cell::Cell as StdCell;
    use std::rc::Rc;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([20, 20, 200, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageOutputFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn asset(variant: &str, data: Vec<u8>) -> SignatureAsset {
        SignatureAsset {
            base_name: "alice".to_string(),
            variant_id: variant.to_string(),
            source: Box::new(MemorySource(data)),
            width: 0,
            height: 0,
        }
    }

    /// Counts how often the byte source is actually read.
    struct CountingSource {
        data: Vec<u8>,
        reads: Rc<StdCell<usize>>,
    }

    impl ImageSource for CountingSource {
        fn bytes(&self) -> crate::error::Result<std::borrow::Cow<'_, [u8]>> {
            self.reads.set(self.reads.get() + 1);
            Ok(std::borrow::Cow::Borrowed(&self.data))
        }
    }

    #[test]
    fn renders_and_caches_by_variant_and_rotation() {
        let reads = Rc::new(StdCell::new(0));
        let asset = SignatureAsset {
            base_name: "alice".to_string(),
            variant_id: "v1".to_string(),
            source: Box::new(CountingSource {
                data: png_bytes(40, 16),
                reads: Rc::clone(&reads),
            }),
            width: 40,
            height: 16,
        };
        let options = EngineOptions::default();
        let mut cache = RasterCache::new();

        for _ in 0..5 {
            let outcome = cache.get_or_render(&asset, 3, &options);
            assert!(matches!(outcome, RenderOutcome::Bitmap(_)));
        }
        assert_eq!(reads.get(), 1, "source decoded more than once per key");
        assert_eq!(cache.stats(), (4, 1));

        // A different rotation is a distinct key.
        cache.get_or_render(&asset, -3, &options);
        assert_eq!(cache.stats(), (4, 2));
        assert_eq!(reads.get(), 2);
    }

    #[test]
    fn zero_rotation_uses_the_cache_path_too() {
        let mut cache = RasterCache::new();
        let a = asset("v1", png_bytes(30, 10));
        let options = EngineOptions::default();

        assert!(matches!(
            cache.get_or_render(&a, 0, &options),
            RenderOutcome::Bitmap(_)
        ));
        cache.get_or_render(&a, 0, &options);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn rotation_expands_canvas_not_clips() {
        let mut cache = RasterCache::new();
        let a = asset("v1", png_bytes(100, 20));
        let options = EngineOptions::default();

        if let RenderOutcome::Bitmap(bmp) = cache.get_or_render(&a, 5, &options) {
            assert!(bmp.width >= 100);
            assert!(bmp.height > 20);
        } else {
            panic!("expected a bitmap");
        }
    }

    #[test]
    fn oversized_sources_are_downscaled() {
        let mut cache = RasterCache::new();
        let a = asset("big", png_bytes(1600, 400));
        let options = EngineOptions::default();

        if let RenderOutcome::Bitmap(bmp) = cache.get_or_render(&a, 0, &options) {
            assert!(bmp.width <= options.raster_ceiling_px);
            assert!(bmp.height <= options.raster_ceiling_px);
        } else {
            panic!("expected a bitmap");
        }
    }

    #[test]
    fn small_sources_are_not_upscaled() {
        let mut cache = RasterCache::new();
        let a = asset("small", png_bytes(50, 20));

        if let RenderOutcome::Bitmap(bmp) = cache.get_or_render(&a, 0, &EngineOptions::default()) {
            assert_eq!((bmp.width, bmp.height), (50, 20));
        } else {
            panic!("expected a bitmap");
        }
    }

    #[test]
    fn surface_clamp_is_a_render_failure() {
        let mut options = EngineOptions::default();
        options.raster_ceiling_px = 800;
        options.max_surface_px = 100; // force the clamp

        let mut cache = RasterCache::new();
        let a = asset("v1", png_bytes(200, 80));
        assert!(matches!(
            cache.get_or_render(&a, 4, &options),
            RenderOutcome::Unavailable
        ));
    }

    #[test]
    fn undecodable_bytes_fail_once_and_cache() {
        let reads = Rc::new(StdCell::new(0));
        let a = SignatureAsset {
            base_name: "x".to_string(),
            variant_id: "bad".to_string(),
            source: Box::new(CountingSource {
                data: b"definitely not an image".to_vec(),
                reads: Rc::clone(&reads),
            }),
            width: 0,
            height: 0,
        };
        let options = EngineOptions::default();
        let mut cache = RasterCache::new();

        for _ in 0..3 {
            assert!(matches!(
                cache.get_or_render(&a, 2, &options),
                RenderOutcome::Unavailable
            ));
        }
        assert_eq!(reads.get(), 1);
    }
}
