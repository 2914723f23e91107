//! Error types for export and image loading.

use thiserror::Error;

/// Result type for export operations.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while exporting a page or loading an image.
#[derive(Debug, Error)]
pub enum ExportError {
    /// PDF generation failed.
    #[error("PDF generation failed: {0}")]
    Pdf(String),

    /// Image data could not be decoded.
    #[error("Image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// The uploaded data is not a usable background image.
    #[error("Unsupported background image: {0}")]
    UnsupportedImage(String),
}
