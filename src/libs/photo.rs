//! Photo normalization for camera captures and stored blobs.
//!
//! Every function is best-effort: when the bytes cannot be decoded they are
//! passed through untouched instead of failing the request.

use std::io::Cursor;

use base64::prelude::{Engine, BASE64_STANDARD};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};

/// Attendance photos are bounded to this box before storage.
pub const CAPTURE_MAX: (u32, u32) = (640, 480);
pub const CAPTURE_QUALITY: u8 = 60;
/// Inline preview size for today's summary.
pub const THUMBNAIL_EDGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Keeps transparency when the source has any (RGBA, LA, palette with a
/// transparent index), otherwise drops to plain RGB.
fn normalize_mode(img: DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.into_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.into_rgb8())
    }
}

/// Shrinks to fit inside `max` keeping the aspect ratio; never enlarges.
fn bound(img: DynamicImage, (w, h): (u32, u32)) -> DynamicImage {
    if img.width() <= w && img.height() <= h {
        img
    } else {
        img.thumbnail(w, h)
    }
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Png => img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?,
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            // JPEG carries no alpha channel
            img.to_rgb8().write_with_encoder(encoder)?;
        }
    }
    Ok(buf)
}

/// Re-encodes any decodable blob; undecodable bytes come back unchanged.
pub fn normalize(bytes: &[u8], format: OutputFormat) -> Vec<u8> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let img = normalize_mode(img);
            encode(&img, format, 90).unwrap_or_else(|e| {
                tracing::warn!("image re-encode failed: {e}");
                bytes.to_vec()
            })
        }
        Err(e) => {
            tracing::debug!("image decode failed, passing bytes through: {e}");
            bytes.to_vec()
        }
    }
}

pub fn to_png(bytes: &[u8]) -> Vec<u8> {
    normalize(bytes, OutputFormat::Png)
}

/// Attendance capture path: bound to `max`, lossy JPEG at `quality`.
pub fn compress(bytes: &[u8], max: (u32, u32), quality: u8) -> Vec<u8> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let img = bound(img, max);
            encode(&img, OutputFormat::Jpeg, quality).unwrap_or_else(|e| {
                tracing::warn!("image compression failed: {e}");
                bytes.to_vec()
            })
        }
        Err(e) => {
            tracing::warn!("image compression failed: {e}");
            bytes.to_vec()
        }
    }
}

pub fn compress_capture(bytes: &[u8]) -> Vec<u8> {
    compress(bytes, CAPTURE_MAX, CAPTURE_QUALITY)
}

pub fn data_url(bytes: &[u8], format: OutputFormat) -> String {
    format!("data:{};base64,{}", format.mime(), BASE64_STANDARD.encode(bytes))
}

/// Small JPEG preview for inline display; `None` if the blob is not an image.
pub fn thumbnail_data_url(bytes: &[u8], edge: u32) -> Option<String> {
    let img = image::load_from_memory(bytes).ok()?;
    let thumb = bound(img, (edge, edge));
    let jpeg = encode(&thumb, OutputFormat::Jpeg, 75).ok()?;
    Some(data_url(&jpeg, OutputFormat::Jpeg))
}

/// Content type of a stored blob for full-size previews.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    use super::*;

    fn png_of(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn opaque(w: u32, h: u32) -> Vec<u8> {
        png_of(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 30, 30]))))
    }

    #[test]
    fn undecodable_bytes_pass_through() {
        let raw = b"definitely not an image".to_vec();
        assert_eq!(normalize(&raw, OutputFormat::Png), raw);
        assert_eq!(compress_capture(&raw), raw);
        assert!(thumbnail_data_url(&raw, THUMBNAIL_EDGE).is_none());
    }

    #[test]
    fn alpha_is_preserved_in_png() {
        let src = png_of(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            4,
            4,
            Rgba([0, 0, 255, 10]),
        )));
        let out = image::load_from_memory(&to_png(&src)).unwrap();
        assert!(out.color().has_alpha());
    }

    #[test]
    fn opaque_sources_become_rgb() {
        let out = image::load_from_memory(&to_png(&opaque(4, 4))).unwrap();
        assert!(!out.color().has_alpha());
    }

    #[test]
    fn capture_is_bounded_and_jpeg() {
        let out = compress_capture(&opaque(1280, 960));
        assert_eq!(sniff_mime(&out), "image/jpeg");
        let img = image::load_from_memory(&out).unwrap();
        assert!(img.width() <= 640 && img.height() <= 480);
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[test]
    fn small_capture_is_not_enlarged() {
        let img = image::load_from_memory(&compress_capture(&opaque(320, 200))).unwrap();
        assert_eq!(img.dimensions(), (320, 200));
    }

    #[test]
    fn thumbnail_is_a_jpeg_data_url() {
        let url = thumbnail_data_url(&opaque(400, 300), THUMBNAIL_EDGE).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let bytes = BASE64_STANDARD
            .decode(url.trim_start_matches("data:image/jpeg;base64,"))
            .unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(img.width() <= THUMBNAIL_EDGE && img.height() <= THUMBNAIL_EDGE);
    }
}
