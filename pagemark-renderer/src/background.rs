//! Loading uploaded images into page backgrounds.
//!
//! Hosts hand us either raw bytes (file pickers) or a base64 data URI
//! (drag and drop). Only PNG and JPEG survive to the PDF, so anything else
//! is rejected up front rather than at export time.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{GenericImageView, ImageFormat};
use pagemark_core::background::{BackgroundImage, ImageEncoding};

use crate::error::{ExportError, ExportResult};

/// Probe encoded image bytes and wrap them as a page background.
///
/// # Errors
///
/// Returns [`ExportError::UnsupportedImage`] for formats other than PNG and
/// JPEG, and [`ExportError::Image`] when the bytes do not decode.
pub fn from_bytes(data: Vec<u8>) -> ExportResult<BackgroundImage> {
    let encoding = match image::guess_format(&data)? {
        ImageFormat::Png => ImageEncoding::Png,
        ImageFormat::Jpeg => ImageEncoding::Jpeg,
        other => {
            return Err(ExportError::UnsupportedImage(format!(
                "{other:?} backgrounds cannot be embedded"
            )))
        }
    };
    let decoded = image::load_from_memory(&data)?;
    let (width_px, height_px) = decoded.dimensions();
    tracing::debug!("Loaded {encoding:?} background, {width_px}x{height_px}px");
    Ok(BackgroundImage::new(data, encoding, width_px, height_px))
}

/// Decode a `data:image/...;base64,` URI into a page background.
///
/// # Errors
///
/// Returns [`ExportError::UnsupportedImage`] when the URI is not a base64
/// image data URI, plus everything [`from_bytes`] can return.
pub fn from_data_uri(uri: &str) -> ExportResult<BackgroundImage> {
    let rest = uri
        .strip_prefix("data:image/")
        .ok_or_else(|| ExportError::UnsupportedImage("not an image data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ExportError::UnsupportedImage("data URI has no payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(ExportError::UnsupportedImage(
            "data URI is not base64-encoded".to_string(),
        ));
    }
    let data = STANDARD
        .decode(payload)
        .map_err(|e| ExportError::UnsupportedImage(format!("invalid base64 payload: {e}")))?;
    from_bytes(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgba8(width, height);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).expect("png encode");
        buf.into_inner()
    }

    #[test]
    fn png_bytes_probe_to_dimensions() {
        let background = from_bytes(png_bytes(595, 842)).expect("valid png");
        assert_eq!(background.dimensions(), (595, 842));
        assert_eq!(background.encoding(), ImageEncoding::Png);
    }

    #[test]
    fn data_uri_round_trips() {
        let encoded = STANDARD.encode(png_bytes(100, 100));
        let uri = format!("data:image/png;base64,{encoded}");
        let background = from_data_uri(&uri).expect("valid data uri");
        assert_eq!(background.dimensions(), (100, 100));
    }

    #[test]
    fn non_image_uris_are_rejected() {
        assert!(matches!(
            from_data_uri("data:text/plain;base64,aGk="),
            Err(ExportError::UnsupportedImage(_))
        ));
        assert!(matches!(
            from_data_uri("data:image/png,plain-payload"),
            Err(ExportError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn unsupported_formats_are_rejected() {
        let img = image::DynamicImage::new_rgba8(4, 4);
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Bmp).expect("bmp encode");
        assert!(matches!(
            from_bytes(buf.into_inner()),
            Err(ExportError::UnsupportedImage(_))
        ));
    }
}
