//! Page export to PDF.
//!
//! Export is split in two: a scene walk turns an [`EditorSession`] into a
//! flat list of [`DrawItem`]s (screen-only overlays never make it in), and a
//! serializer replays the items into a [`PdfSink`]. The printpdf-backed
//! [`PdfWriter`] is the production sink; tests replay into a recording sink
//! instead.

use pagemark_core::background::BackgroundImage;
use pagemark_core::{
    EditorSession, Marker, PaperSize, Rect, BOX_STROKE_WIDTH, EXPORT_FILENAME, MARKER_MARGIN,
};
use printpdf::path::PaintMode;
use printpdf::{Color, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Rgb};

use crate::error::{ExportError, ExportResult};

/// Points per millimetre, for stroke widths.
const PT_PER_MM: f32 = 72.0 / 25.4;

/// One printable element. The set is closed: anything a future scene might
/// contain that has no print form arrives as [`DrawItem::Unsupported`] and
/// is skipped, never guessed at.
#[derive(Debug)]
pub enum DrawItem<'a> {
    /// Solid black rectangle (marker modules).
    Fill(Rect),
    /// Solid white rectangle, drawn under markers and tick boxes so they
    /// stay legible over a background image.
    Backing(Rect),
    /// Black outlined rectangle with its stroke width in mm (tick boxes).
    Stroke {
        /// Outline rectangle.
        rect: Rect,
        /// Stroke width in mm.
        width: f64,
    },
    /// An image stretched over a page region.
    Image {
        /// The encoded image.
        image: &'a BackgroundImage,
        /// Target region in mm.
        rect: Rect,
    },
    /// A named group of items, drawn in order.
    Group {
        /// Group label, for diagnostics.
        label: &'static str,
        /// Contained items.
        items: Vec<DrawItem<'a>>,
    },
    /// An element the print path cannot represent.
    Unsupported {
        /// What was skipped.
        label: String,
    },
}

/// Walk a session into printable items, bottom layer first: the background
/// image, then both markers, then the tick boxes.
///
/// Screen-only state is deliberately absent: safe-area and no-content
/// overlays, selection highlights (every outline prints black) and audio
/// regions, which exist for scanners rather than printers.
#[must_use]
pub fn scene_items(session: &EditorSession) -> Vec<DrawItem<'_>> {
    let mut items = Vec::new();

    if let Some(image) = session.background() {
        let paper = session.paper();
        items.push(DrawItem::Image {
            image,
            rect: Rect::new(0.0, 0.0, f64::from(paper.width), f64::from(paper.height)),
        });
    }

    let markers = session.markers();
    items.push(marker_group(
        "key marker",
        markers.left(),
        markers.marker_size(),
        markers.module_size(),
    ));
    items.push(marker_group(
        "dimension marker",
        markers.right(),
        markers.marker_size(),
        markers.module_size(),
    ));

    let box_size = session.boxes().box_size();
    let boxes = session
        .boxes()
        .boxes()
        .iter()
        .flat_map(|b| {
            let bbox = b.bbox(box_size);
            [
                DrawItem::Backing(bbox),
                DrawItem::Stroke {
                    rect: bbox,
                    width: BOX_STROKE_WIDTH,
                },
            ]
        })
        .collect();
    items.push(DrawItem::Group {
        label: "tick boxes",
        items: boxes,
    });

    items
}

/// One marker as a white backing square with its dark modules filled inside
/// the quiet zone.
fn marker_group<'a>(
    label: &'static str,
    marker: &Marker,
    marker_size: f64,
    module_size: f64,
) -> DrawItem<'a> {
    let origin = marker.origin;
    let mut items = vec![DrawItem::Backing(Rect::new(
        origin.x,
        origin.y,
        marker_size,
        marker_size,
    ))];
    items.extend(marker.pattern.dark_modules().map(|(col, row)| {
        DrawItem::Fill(Rect::new(
            origin.x + MARKER_MARGIN + f64::from(col) * module_size,
            origin.y + MARKER_MARGIN + f64::from(row) * module_size,
            module_size,
            module_size,
        ))
    }));
    DrawItem::Group { label, items }
}

/// Destination for serialized draw items. Coordinates are page mm with a
/// top-left origin; sinks handle any flipping themselves.
pub trait PdfSink {
    /// Draw a solid black rectangle.
    ///
    /// # Errors
    ///
    /// Sink-specific.
    fn fill_rect(&mut self, rect: Rect) -> ExportResult<()>;

    /// Draw a solid white rectangle.
    ///
    /// # Errors
    ///
    /// Sink-specific.
    fn backing_rect(&mut self, rect: Rect) -> ExportResult<()>;

    /// Draw a black rectangle outline.
    ///
    /// # Errors
    ///
    /// Sink-specific.
    fn stroke_rect(&mut self, rect: Rect, width: f64) -> ExportResult<()>;

    /// Draw an image stretched over a region.
    ///
    /// # Errors
    ///
    /// Sink-specific.
    fn draw_image(&mut self, image: &BackgroundImage, rect: Rect) -> ExportResult<()>;
}

/// Replay items into a sink, in order. Unsupported items are skipped with a
/// diagnostic rather than failing the whole export.
///
/// # Errors
///
/// Propagates the first sink error.
pub fn serialize(items: &[DrawItem<'_>], sink: &mut dyn PdfSink) -> ExportResult<()> {
    for item in items {
        match item {
            DrawItem::Fill(rect) => sink.fill_rect(*rect)?,
            DrawItem::Backing(rect) => sink.backing_rect(*rect)?,
            DrawItem::Stroke { rect, width } => sink.stroke_rect(*rect, *width)?,
            DrawItem::Image { image, rect } => sink.draw_image(image, *rect)?,
            DrawItem::Group { items, .. } => serialize(items, sink)?,
            DrawItem::Unsupported { label } => {
                tracing::warn!("Skipping unprintable element: {label}");
            }
        }
    }
    Ok(())
}

/// Render a session straight to PDF bytes.
///
/// # Errors
///
/// Returns [`ExportError::Pdf`] when document generation fails.
pub fn export_page(session: &EditorSession) -> ExportResult<Vec<u8>> {
    let mut writer = PdfWriter::new(session.paper());
    serialize(&scene_items(session), &mut writer)?;
    writer.into_bytes()
}

/// The suggested download filename.
#[must_use]
pub fn export_filename() -> String {
    format!("{EXPORT_FILENAME}.pdf")
}

/// printpdf-backed sink producing a single-page document at the paper's
/// exact mm dimensions (landscape pages come out landscape for free).
pub struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    page_height: f64,
}

impl PdfWriter {
    /// Create a one-page document for the given paper.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(paper: PaperSize) -> Self {
        let (doc, page, layer) = PdfDocument::new(
            "Pagemark",
            Mm(paper.width as f32),
            Mm(paper.height as f32),
            "Page 1",
        );
        let layer = doc.get_page(page).get_layer(layer);
        Self {
            doc,
            layer,
            page_height: f64::from(paper.height),
        }
    }

    /// Finish the document and return its bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Pdf`] when saving fails.
    pub fn into_bytes(self) -> ExportResult<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| ExportError::Pdf(e.to_string()))
    }

    /// Flip a top-left rect into PDF bottom-left corners (llx, lly, urx, ury).
    #[allow(clippy::cast_possible_truncation)]
    fn flip(&self, rect: Rect) -> (f32, f32, f32, f32) {
        (
            rect.x as f32,
            (self.page_height - rect.bottom()) as f32,
            rect.right() as f32,
            (self.page_height - rect.y) as f32,
        )
    }
}

impl PdfSink for PdfWriter {
    fn fill_rect(&mut self, rect: Rect) -> ExportResult<()> {
        let (llx, lly, urx, ury) = self.flip(rect);
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        self.layer.add_rect(
            printpdf::Rect::new(Mm(llx), Mm(lly), Mm(urx), Mm(ury)).with_mode(PaintMode::Fill),
        );
        Ok(())
    }

    fn backing_rect(&mut self, rect: Rect) -> ExportResult<()> {
        let (llx, lly, urx, ury) = self.flip(rect);
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(1.0, 1.0, 1.0, None)));
        self.layer.add_rect(
            printpdf::Rect::new(Mm(llx), Mm(lly), Mm(urx), Mm(ury)).with_mode(PaintMode::Fill),
        );
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn stroke_rect(&mut self, rect: Rect, width: f64) -> ExportResult<()> {
        let (llx, lly, urx, ury) = self.flip(rect);
        self.layer
            .set_outline_color(Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)));
        self.layer.set_outline_thickness(width as f32 * PT_PER_MM);
        self.layer.add_rect(
            printpdf::Rect::new(Mm(llx), Mm(lly), Mm(urx), Mm(ury)).with_mode(PaintMode::Stroke),
        );
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn draw_image(&mut self, image: &BackgroundImage, rect: Rect) -> ExportResult<()> {
        // Decode with printpdf's bundled image crate for compatibility.
        let dynamic = printpdf::image_crate::load_from_memory(image.data())
            .map_err(|e| ExportError::Pdf(format!("background decode failed: {e}")))?;
        let pdf_image = printpdf::Image::from_dynamic_image(&dynamic);
        let (width_px, height_px) = image.dimensions();

        // At 25.4 dpi one pixel is one mm, so the scale factors stretch the
        // image to the target region exactly.
        let transform = printpdf::ImageTransform {
            translate_x: Some(Mm(rect.x as f32)),
            translate_y: Some(Mm((self.page_height - rect.bottom()) as f32)),
            scale_x: Some(rect.width as f32 / width_px as f32),
            scale_y: Some(rect.height as f32 / height_px as f32),
            dpi: Some(25.4),
            ..Default::default()
        };
        pdf_image.add_to_layer(self.layer.clone(), transform);
        Ok(())
    }
}
