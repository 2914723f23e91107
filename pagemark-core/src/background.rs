//! Background images and pixel-to-paper sizing.
//!
//! A page can be created from a scanned form: the paper dimensions are then
//! derived from the image's pixel size at the assumed scan resolution. When
//! an image is attached to an existing page instead, only its aspect ratio
//! is checked; the image is stretched to the page at export time.

use crate::error::{PageError, PageResult};
use crate::geometry::PaperSize;
use crate::{DEFAULT_DPI, MINIMUM_PAPER_SIZE};

const MM_PER_INCH: f64 = 25.4;

/// Maximum allowed difference between image and paper aspect ratios.
const RATIO_TOLERANCE: f64 = 0.01;

/// Encodings accepted for page backgrounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// PNG-encoded image data.
    Png,
    /// JPEG-encoded image data.
    Jpeg,
}

/// An encoded background image with its pixel dimensions.
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    data: Vec<u8>,
    encoding: ImageEncoding,
    width_px: u32,
    height_px: u32,
}

impl BackgroundImage {
    /// Wrap already-decoded image metadata around its encoded bytes.
    #[must_use]
    pub fn new(data: Vec<u8>, encoding: ImageEncoding, width_px: u32, height_px: u32) -> Self {
        Self {
            data,
            encoding,
            width_px,
            height_px,
        }
    }

    /// The encoded image bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The image encoding.
    #[must_use]
    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    /// Pixel dimensions as (width, height).
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    /// Width/height aspect ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.width_px) / f64::from(self.height_px)
    }

    /// Derive the paper size from the pixel dimensions, assuming the image
    /// was scanned at the default resolution.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PaperTooSmall`] when either derived edge falls
    /// below the minimum supported paper size.
    pub fn paper_size(&self) -> PageResult<PaperSize> {
        let width = px_to_mm(self.width_px);
        let height = px_to_mm(self.height_px);
        if width < MINIMUM_PAPER_SIZE || height < MINIMUM_PAPER_SIZE {
            return Err(PageError::PaperTooSmall {
                width,
                height,
                minimum: MINIMUM_PAPER_SIZE,
            });
        }
        Ok(PaperSize::new(width, height))
    }

    /// Check that the image can back the given paper without visible
    /// distortion.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::ImageRatioMismatch`] when the aspect ratios
    /// differ by more than the tolerance.
    pub fn check_ratio(&self, paper: PaperSize) -> PageResult<()> {
        let image = self.ratio();
        let paper_ratio = paper.ratio();
        if (image - paper_ratio).abs() > RATIO_TOLERANCE {
            return Err(PageError::ImageRatioMismatch {
                image,
                paper: paper_ratio,
            });
        }
        Ok(())
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn px_to_mm(px: u32) -> u32 {
    (f64::from(px) / DEFAULT_DPI * MM_PER_INCH).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width_px: u32, height_px: u32) -> BackgroundImage {
        BackgroundImage::new(Vec::new(), ImageEncoding::Png, width_px, height_px)
    }

    #[test]
    fn a4_scan_resolves_to_a4_paper() {
        // A4 at 72 dpi is 595 x 842 px.
        let paper = image(595, 842).paper_size().unwrap();
        assert_eq!(paper.width, 210);
        assert_eq!(paper.height, 297);
    }

    #[test]
    fn tiny_scans_are_rejected() {
        let err = image(100, 842).paper_size().unwrap_err();
        assert!(matches!(
            err,
            PageError::PaperTooSmall { width: 35, .. }
        ));
    }

    #[test]
    fn ratio_check_tolerates_rounding() {
        let paper = PaperSize::new(210, 297);
        assert!(image(595, 842).check_ratio(paper).is_ok());
        assert!(matches!(
            image(842, 595).check_ratio(paper),
            Err(PageError::ImageRatioMismatch { .. })
        ));
    }
}
