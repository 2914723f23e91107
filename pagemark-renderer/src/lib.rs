//! # Pagemark Renderer
//!
//! Print rendering for pagemark pages. Walks an editor session into a flat
//! draw-item scene (markers, tick boxes, background image; never screen
//! overlays) and serializes it to a single-page PDF at the paper's exact mm
//! dimensions, plus helpers for loading uploaded background images.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod background;
pub mod error;
pub mod export;

pub use background::{from_bytes, from_data_uri};
pub use error::{ExportError, ExportResult};
pub use export::{export_filename, export_page, scene_items, DrawItem, PdfSink, PdfWriter};

/// Renderer version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
