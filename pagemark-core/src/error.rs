//! Error types for layout and sync operations.

use thiserror::Error;

/// Result type for page operations.
pub type PageResult<T> = Result<T, PageError>;

/// Errors that can occur while composing or synchronizing a page.
#[derive(Debug, Error)]
pub enum PageError {
    /// Persisted marker positions cannot be resolved to whole grid counts.
    #[error("Malformed page geometry: {0}")]
    MalformedGeometry(String),

    /// Paper dimensions are below the supported minimum.
    #[error("Paper too small: {width}mm x {height}mm (minimum {minimum}mm)")]
    PaperTooSmall {
        /// Requested width in mm.
        width: u32,
        /// Requested height in mm.
        height: u32,
        /// Minimum accepted edge in mm.
        minimum: u32,
    },

    /// A background image's aspect ratio does not match the page's.
    #[error("Image ratio {image:.4} does not match paper ratio {paper:.4}")]
    ImageRatioMismatch {
        /// Width/height ratio of the image.
        image: f64,
        /// Width/height ratio of the paper.
        paper: f64,
    },

    /// The referenced annotation does not exist.
    #[error("Annotation not found: {0}")]
    AnnotationNotFound(usize),

    /// The operation needs a server-confirmed id, but the entity still has a
    /// transient one.
    #[error("Entity has not been acknowledged by the server yet")]
    PendingEntity,

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
