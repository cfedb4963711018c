//! Synchronous image decoder facade (§4.B). Delegates actual format
//! decoding to the `image` crate (the specification's decode primitive)
//! and adds target-size-aware downscaling so a 4K source destined for a
//! 1080p `center`/`tile` output doesn't get uploaded to the GPU at full
//! resolution.

use std::path::{Path, PathBuf};

use driftwall_config::DisplayMode;
use image::imageops::FilterType;
use image::GenericImageView;

use crate::error::DecodeError;

pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_path: PathBuf,
}

/// Decodes `path` to 8-bit RGBA, optionally downscaling during decode when
/// the source is much larger than `(target_w, target_h)` for `display_mode`.
/// Vertical flip is deliberately NOT applied here; it happens at GPU upload
/// time (§4.B).
pub fn decode(
    path: &Path,
    target_w: u32,
    target_h: u32,
    display_mode: DisplayMode,
) -> Result<DecodedImage, DecodeError> {
    let reader = image::ImageReader::open(path)
        .map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .with_guessed_format()
        .map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if reader.format().is_none() {
        return Err(DecodeError::FormatUnsupported(path.to_path_buf()));
    }

    let image = reader.decode().map_err(|source| DecodeError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let (source_w, source_h) = image.dimensions();
    let image = match downscale_target(source_w, source_h, target_w, target_h, display_mode) {
        Some((w, h)) => image.resize(w, h, FilterType::Lanczos3),
        None => image,
    };

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        pixels: rgba.into_raw(),
        width,
        height,
        source_path: path.to_path_buf(),
    })
}

/// Returns `Some((w, h))` to downscale to when the source is materially
/// larger than needed, or `None` to decode at native resolution. `fit`/
/// `fill` downscale to cover the target box (preserving aspect, then the
/// caller crops/letterboxes at render time); `center`/`tile` only
/// downscale when the source exceeds the target outright, since those
/// modes show source pixels 1:1.
fn downscale_target(
    source_w: u32,
    source_h: u32,
    target_w: u32,
    target_h: u32,
    display_mode: DisplayMode,
) -> Option<(u32, u32)> {
    if target_w == 0 || target_h == 0 || source_w <= target_w && source_h <= target_h {
        return None;
    }

    match display_mode {
        DisplayMode::Fit | DisplayMode::Fill | DisplayMode::Stretch => {
            let scale_x = target_w as f64 / source_w as f64;
            let scale_y = target_h as f64 / source_h as f64;
            let scale = if display_mode == DisplayMode::Fill {
                scale_x.max(scale_y)
            } else {
                scale_x.min(scale_y)
            };
            if scale >= 1.0 {
                None
            } else {
                Some((
                    ((source_w as f64 * scale).round() as u32).max(1),
                    ((source_h as f64 * scale).round() as u32).max(1),
                ))
            }
        }
        DisplayMode::Center | DisplayMode::Tile => {
            if source_w > target_w || source_h > target_h {
                Some((source_w.min(target_w.max(1)), source_h.min(target_h.max(1))))
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    #[test]
    fn fit_downscale_preserves_aspect_to_the_smaller_axis() {
        let target = downscale_target(4000, 2000, 1920, 1080, DisplayMode::Fit);
        let (w, h) = target.expect("should downscale");
        assert!(w <= 1920 && h <= 1080);
        assert!((w as f64 / h as f64 - 2.0).abs() < 0.05);
    }

    #[test]
    fn source_smaller_than_target_is_not_downscaled() {
        assert_eq!(downscale_target(800, 600, 1920, 1080, DisplayMode::Fit), None);
    }

    #[test]
    fn decode_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-image.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let result = decode(&path, 100, 100, DisplayMode::Stretch);
        assert!(result.is_err());
    }

    #[test]
    fn decode_round_trips_a_small_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swatch.png");
        let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        buffer.save(&path).unwrap();

        let decoded = decode(&path, 4, 4, DisplayMode::Stretch).unwrap();
        assert_eq!(decoded.width, 4);
        assert_eq!(decoded.height, 4);
        assert_eq!(decoded.pixels.len(), 4 * 4 * 4);
    }
}
