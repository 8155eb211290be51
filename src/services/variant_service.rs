//! src/services/variant_service.rs
//!
//! VariantService — derives serving-optimized renditions from an original
//! asset. A "full" rendition bounds the longest edge to 2000px without ever
//! upscaling; a "thumb" is a 400x400 cover crop biased toward the highest-
//! contrast region. Renditions upload independently to deterministic derived
//! paths, so the whole call is safely re-runnable: uploads overwrite and a
//! stage that already landed stays in place if a later stage fails.

use crate::services::object_store::{ObjectStore, ObjectStoreError};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, codecs::jpeg::JpegEncoder, imageops::FilterType};
use serde::Serialize;
use std::{cmp::Ordering, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

/// Longest edge of the "full" rendition.
const FULL_MAX_EDGE: u32 = 2000;
const FULL_QUALITY: u8 = 85;
/// Square side of the thumbnail rendition.
const THUMB_SIDE: u32 = 400;
const THUMB_QUALITY: u8 = 80;

/// Which rendition an upload failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantStage {
    Full,
    Thumb,
}

impl fmt::Display for VariantStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantStage::Full => write!(f, "full"),
            VariantStage::Thumb => write!(f, "thumb"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("source object `{0}` missing")]
    SourceMissing(String),
    #[error("uploading {stage} rendition failed: {source}")]
    UploadFailed {
        stage: VariantStage,
        #[source]
        source: ObjectStoreError,
    },
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("render task failed: {0}")]
    Render(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Store(ObjectStoreError),
}

pub type VariantResult<T> = Result<T, VariantError>;

/// Parameters for a variant generation call.
#[derive(Clone, Debug)]
pub struct VariantRequest {
    pub path: String,
    pub generate_full: bool,
    pub generate_thumbs: bool,
}

/// Derived paths and byte sizes produced by one generation call.
#[derive(Clone, Debug, Serialize)]
pub struct VariantSet {
    pub full_path: Option<String>,
    pub thumb_path: Option<String>,
    pub original_size: u64,
    pub full_size: Option<u64>,
    pub thumb_size: Option<u64>,
}

#[derive(Clone)]
pub struct VariantService {
    store: Arc<dyn ObjectStore>,
}

struct Rendered {
    full: Option<Vec<u8>>,
    thumb: Option<Vec<u8>>,
}

impl VariantService {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Generate the requested renditions of the original at `request.path`.
    ///
    /// No metadata is written: derived paths are computable on demand from
    /// the original's path, so nothing here is authoritative for lifecycle
    /// decisions.
    pub async fn generate(&self, request: VariantRequest) -> VariantResult<VariantSet> {
        let original = match self.store.download(&request.path).await {
            Ok(bytes) => bytes,
            Err(ObjectStoreError::NotFound(path)) => {
                return Err(VariantError::SourceMissing(path));
            }
            Err(err) => return Err(VariantError::Store(err)),
        };
        let original_size = original.len() as u64;

        let want_full = request.generate_full;
        let want_thumb = request.generate_thumbs;
        let rendered = tokio::task::spawn_blocking(move || render(&original, want_full, want_thumb))
            .await??;

        let mut set = VariantSet {
            full_path: None,
            thumb_path: None,
            original_size,
            full_size: None,
            thumb_size: None,
        };

        if let Some(full) = rendered.full {
            let path = derived_path(&request.path, "full");
            set.full_size = Some(full.len() as u64);
            self.store
                .upload(&path, Bytes::from(full))
                .await
                .map_err(|source| VariantError::UploadFailed {
                    stage: VariantStage::Full,
                    source,
                })?;
            debug!("uploaded full rendition to {}", path);
            set.full_path = Some(path);
        }

        if let Some(thumb) = rendered.thumb {
            let path = derived_path(&request.path, "thumbs");
            set.thumb_size = Some(thumb.len() as u64);
            self.store
                .upload(&path, Bytes::from(thumb))
                .await
                .map_err(|source| VariantError::UploadFailed {
                    stage: VariantStage::Thumb,
                    source,
                })?;
            debug!("uploaded thumb rendition to {}", path);
            set.thumb_path = Some(path);
        }

        info!(
            "generated variants for {} (original {} bytes)",
            request.path, original_size
        );
        Ok(set)
    }
}

/// Decode the original once and encode the requested renditions.
fn render(original: &[u8], want_full: bool, want_thumb: bool) -> VariantResult<Rendered> {
    if !want_full && !want_thumb {
        return Ok(Rendered {
            full: None,
            thumb: None,
        });
    }
    let img = image::load_from_memory(original)?;

    let full = if want_full {
        Some(encode_jpeg(&bounded_full(&img), FULL_QUALITY)?)
    } else {
        None
    };
    let thumb = if want_thumb {
        Some(encode_jpeg(&cover_thumb(&img), THUMB_QUALITY)?)
    } else {
        None
    };
    Ok(Rendered { full, thumb })
}

/// Bound the longest edge to `FULL_MAX_EDGE`, preserving aspect and never
/// upscaling smaller images.
fn bounded_full(img: &DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= FULL_MAX_EDGE && h <= FULL_MAX_EDGE {
        img.clone()
    } else {
        img.resize(FULL_MAX_EDGE, FULL_MAX_EDGE, FilterType::Lanczos3)
    }
}

/// Cover-fit crop to a `THUMB_SIDE` square.
///
/// The image is scaled so the smaller edge matches the square, then the
/// crop window slides along the overflowing axis to the candidate with the
/// highest luminance variance, which tends to land on the subject rather
/// than flat sky or backdrop.
fn cover_thumb(img: &DynamicImage) -> DynamicImage {
    let (w, h) = img.dimensions();
    let scale = (THUMB_SIDE as f64 / w as f64).max(THUMB_SIDE as f64 / h as f64);
    let rw = ((w as f64 * scale).round() as u32).max(THUMB_SIDE);
    let rh = ((h as f64 * scale).round() as u32).max(THUMB_SIDE);
    let resized = img.resize_exact(rw, rh, FilterType::Lanczos3);
    if rw == THUMB_SIDE && rh == THUMB_SIDE {
        return resized;
    }

    let gray = resized.to_luma8();
    let horizontal = rw > THUMB_SIDE;
    let span = if horizontal {
        rw - THUMB_SIDE
    } else {
        rh - THUMB_SIDE
    };

    // Five evenly spaced candidate windows, ends included.
    let candidates = (0..=4).map(|i| span * i / 4);
    let best = candidates
        .map(|offset| {
            let (x, y) = if horizontal { (offset, 0) } else { (0, offset) };
            (offset, window_variance(&gray, x, y))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(offset, _)| offset)
        .unwrap_or(span / 2);

    let (x, y) = if horizontal { (best, 0) } else { (0, best) };
    resized.crop_imm(x, y, THUMB_SIDE, THUMB_SIDE)
}

/// Sampled luminance variance of a `THUMB_SIDE` square window.
fn window_variance(gray: &image::GrayImage, x0: u32, y0: u32) -> f64 {
    const STEP: u32 = 8;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0.0;
    let mut y = y0;
    while y < y0 + THUMB_SIDE && y < gray.height() {
        let mut x = x0;
        while x < x0 + THUMB_SIDE && x < gray.width() {
            let v = gray.get_pixel(x, y).0[0] as f64;
            sum += v;
            sum_sq += v * v;
            count += 1.0;
            x += STEP;
        }
        y += STEP;
    }
    if count == 0.0 {
        return 0.0;
    }
    let mean = sum / count;
    sum_sq / count - mean * mean
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.to_rgb8().write_with_encoder(encoder)?;
    Ok(buf)
}

/// Derived path for a rendition of `original`.
///
/// The directory keeps its shape with the first `originals` segment
/// stripped, renditions nest under `optimized/{kind}/`, and the extension
/// becomes `.jpg`:
/// `acme/2025/gala/originals/img.png` -> `acme/2025/gala/optimized/full/img.jpg`.
pub fn derived_path(original: &str, kind: &str) -> String {
    let mut segments: Vec<&str> = original.split('/').collect();
    let filename = segments.pop().unwrap_or(original);
    let stem = match filename.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => filename,
    };

    let mut stripped = false;
    let dirs: Vec<&str> = segments
        .into_iter()
        .filter(|segment| {
            if !stripped && *segment == "originals" {
                stripped = true;
                false
            } else {
                true
            }
        })
        .collect();

    if dirs.is_empty() {
        format!("optimized/{}/{}.jpg", kind, stem)
    } else {
        format!("{}/optimized/{}/{}.jpg", dirs.join("/"), kind, stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn derived_path_strips_originals_segment() {
        assert_eq!(
            derived_path("acme/2025/gala/originals/img.jpg", "full"),
            "acme/2025/gala/optimized/full/img.jpg"
        );
        assert_eq!(
            derived_path("acme/2025/gala/originals/img.png", "thumbs"),
            "acme/2025/gala/optimized/thumbs/img.jpg"
        );
    }

    #[test]
    fn derived_path_without_originals_segment() {
        assert_eq!(
            derived_path("acme/uploads/photo.webp", "full"),
            "acme/uploads/optimized/full/photo.jpg"
        );
        assert_eq!(derived_path("img.jpg", "thumbs"), "optimized/thumbs/img.jpg");
    }

    #[test]
    fn derived_path_keeps_dotfiles_intact() {
        assert_eq!(derived_path("acme/.hidden", "full"), "acme/optimized/full/.hidden.jpg");
    }

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn full_rendition_never_upscales() {
        let small = gradient(640, 480);
        let full = bounded_full(&small);
        assert_eq!(full.dimensions(), (640, 480));
    }

    #[test]
    fn full_rendition_bounds_longest_edge() {
        let large = gradient(4000, 1000);
        let full = bounded_full(&large);
        let (w, h) = full.dimensions();
        assert_eq!(w, 2000);
        assert!(h <= 2000);
        // aspect preserved
        assert_eq!(h, 500);
    }

    #[test]
    fn thumb_is_exact_square() {
        for (w, h) in [(1200, 800), (800, 1200), (400, 400), (100, 900)] {
            let thumb = cover_thumb(&gradient(w, h));
            assert_eq!(thumb.dimensions(), (THUMB_SIDE, THUMB_SIDE));
        }
    }

    #[test]
    fn thumb_crop_prefers_high_contrast_region() {
        // Left half flat, right half checkered: the window should slide right.
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(1200, 400, |x, y| {
            if x < 600 {
                image::Rgb([20, 20, 20])
            } else if (x / 8 + y / 8) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        }));
        let gray = img.to_luma8();
        let left = window_variance(&gray, 0, 0);
        let right = window_variance(&gray, 800, 0);
        assert!(right > left);
    }
}
