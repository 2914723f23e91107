//! Pure page geometry: marker sizing, grid counts, placement regions and the
//! mm ↔ local-grid transform.
//!
//! Everything here is millimetre-denominated unless a name says otherwise.
//! The page grid is made of whole-marker cells: a marker occupies exactly one
//! cell, and the right marker encodes how many cells fit across and down the
//! page.

use serde::{Deserialize, Serialize};

use crate::error::{PageError, PageResult};
use crate::pattern::PatternGrid;
use crate::{GRID_SCALE, GRID_UNITS_PER_CELL};

/// Tolerance when checking that stored positions land on whole cells.
const GRID_EPSILON: f64 = 1e-6;

/// A point in page coordinates (mm from the top-left corner).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X in mm.
    pub x: f64,
    /// Y in mm.
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge in mm.
    pub x: f64,
    /// Top edge in mm.
    pub y: f64,
    /// Width in mm.
    pub width: f64,
    /// Height in mm.
    pub height: f64,
}

impl Rect {
    /// Create a rectangle from its top-left corner and size.
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge in mm.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge in mm.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the point lies inside (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.right()
            && point.y >= self.y
            && point.y <= self.bottom()
    }
}

/// Paper dimensions in whole millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperSize {
    /// Width in mm.
    pub width: u32,
    /// Height in mm.
    pub height: u32,
}

impl PaperSize {
    /// Create a paper size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width/height ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// The six integers describing a page's stored geometry: paper size plus the
/// top-left corners of both markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Paper width in mm.
    pub width: u32,
    /// Paper height in mm.
    pub height: u32,
    /// Left (key) marker X.
    pub left_x: i64,
    /// Left (key) marker Y.
    pub left_y: i64,
    /// Right (dimension) marker X.
    pub right_x: i64,
    /// Right (dimension) marker Y.
    pub right_y: i64,
}

/// Which marker a placement operation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerSlot {
    /// Bottom-left marker, encoding the page key.
    Left,
    /// Top-right marker, encoding the grid dimension code.
    Right,
}

/// Whole-marker edge length in mm: the pattern plus its quiet zone, rounded
/// so markers tile the page on integer boundaries.
///
/// Computed once from the key marker's pattern; both markers share the value.
#[must_use]
pub fn marker_size(pattern: &PatternGrid, margin: f64) -> f64 {
    let modules = f64::from(pattern.modules());
    (modules * module_size(pattern, margin) + 2.0 * margin).round()
}

/// Edge length of one pattern module in mm, leaving room for the quiet zone
/// inside a whole-millimetre marker.
#[must_use]
pub fn module_size(pattern: &PatternGrid, margin: f64) -> f64 {
    let modules = f64::from(pattern.modules());
    (modules - 2.0 * margin) / modules
}

/// How many whole marker cells fit across and down the paper.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn grid_counts(paper: PaperSize, marker_size: f64) -> (u32, u32) {
    (
        (f64::from(paper.width) / marker_size).floor() as u32,
        (f64::from(paper.height) / marker_size).floor() as u32,
    )
}

/// The dimension code encoded by the right marker, e.g. `"8x11"`.
#[must_use]
pub fn dimension_code(num_x: u32, num_y: u32) -> String {
    format!("{num_x}x{num_y}")
}

/// Recover grid counts from stored marker corners.
///
/// The markers sit at opposite grid corners, so the counts are
/// `(right.x - left.x) / size + 1` across and `(left.y - right.y) / size + 1`
/// down. Positions that do not land on whole cells mean the persisted state
/// is malformed and the page must be rejected at load time, never clamped.
///
/// # Errors
///
/// Returns [`PageError::MalformedGeometry`] when either division is not
/// exact or a count comes out below one.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn grid_counts_from_positions(
    left: Point,
    right: Point,
    marker_size: f64,
) -> PageResult<(u32, u32)> {
    let num_x = (right.x - left.x) / marker_size + 1.0;
    let num_y = (left.y - right.y) / marker_size + 1.0;
    for (axis, count) in [("x", num_x), ("y", num_y)] {
        if (count - count.round()).abs() > GRID_EPSILON || count < 1.0 - GRID_EPSILON {
            return Err(PageError::MalformedGeometry(format!(
                "marker positions give a non-integral {axis} count of {count}"
            )));
        }
    }
    Ok((num_x.round() as u32, num_y.round() as u32))
}

/// The region the *moving* marker may be dragged into, two whole cells clear
/// of the fixed marker so the two can never collide or read as adjacent
/// cells.
///
/// Must be recomputed whenever the fixed marker moves.
#[must_use]
pub fn safe_area(moving: MarkerSlot, other_bbox: Rect, paper: PaperSize, marker_size: f64) -> Rect {
    let (num_x, num_y) = grid_counts(paper, marker_size);
    match moving {
        MarkerSlot::Left => Rect::new(
            0.0,
            other_bbox.y + 2.0 * marker_size,
            other_bbox.x - marker_size,
            f64::from(num_y) * marker_size - other_bbox.y - 2.0 * marker_size,
        ),
        MarkerSlot::Right => Rect::new(
            other_bbox.x + 2.0 * marker_size,
            0.0,
            f64::from(num_x) * marker_size - other_bbox.x - 2.0 * marker_size,
            other_bbox.y - marker_size,
        ),
    }
}

/// The no-content rectangle spanning both markers (inset by one cell beyond
/// the far corners), inside which page content would confuse the scanner.
#[must_use]
pub fn excluded_region(left_bbox: Rect, right_bbox: Rect, marker_size: f64) -> Rect {
    Rect::new(
        left_bbox.x,
        right_bbox.y,
        right_bbox.x - left_bbox.x + marker_size,
        left_bbox.y - right_bbox.y + marker_size,
    )
}

/// Round a coordinate to the nearest whole-cell multiple, then clamp it so a
/// marker-sized square stays inside `[min, max]`.
#[must_use]
pub fn snap_to_cell(value: f64, marker_size: f64, min: f64, max: f64) -> f64 {
    let snapped = (value / marker_size).round() * marker_size;
    snapped.max(min).min(max - marker_size)
}

/// Anchor for the local grid: the key marker's X and the dimension marker's Y.
#[must_use]
pub fn grid_anchor(left_marker: Point, right_marker: Point) -> Point {
    Point::new(left_marker.x, right_marker.y)
}

/// Convert a local-grid coordinate (100 units = one 21 mm cell) to absolute
/// page mm, anchored at the markers.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn local_to_page(local: i64, anchor: f64) -> i64 {
    ((local as f64) * (GRID_SCALE / GRID_UNITS_PER_CELL) + anchor).round() as i64
}

/// Convert an absolute page mm coordinate back to local grid units.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn page_to_local(page: i64, anchor: f64) -> i64 {
    (((page as f64) - anchor) / (GRID_SCALE / GRID_UNITS_PER_CELL)).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{HashPattern, PatternGenerator};
    use crate::MARKER_MARGIN;

    #[test]
    fn marker_size_is_whole_module_count() {
        let pattern = HashPattern::default().generate("key");
        // 21 modules at (21 - 4)/21 mm each plus a 2mm margin per side.
        assert!((marker_size(&pattern, MARKER_MARGIN) - 21.0).abs() < f64::EPSILON);
    }

    #[test]
    fn both_markers_share_size_and_module_count() {
        let generator = HashPattern::default();
        let left = generator.generate("abcd");
        let right = generator.generate("8x11");
        assert_eq!(left.modules(), right.modules());
        assert!(
            (marker_size(&left, MARKER_MARGIN) - marker_size(&right, MARKER_MARGIN)).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn a4_grid_counts() {
        let paper = PaperSize::new(210, 297);
        assert_eq!(grid_counts(paper, 21.0), (10, 14));
    }

    #[test]
    fn counts_round_trip_through_positions() {
        // Left at bottom-left cell, right at top-right cell of an A4 grid.
        let left = Point::new(0.0, 21.0 * 13.0);
        let right = Point::new(21.0 * 9.0, 0.0);
        let counts = grid_counts_from_positions(left, right, 21.0).unwrap();
        assert_eq!(counts, (10, 14));
    }

    #[test]
    fn misaligned_positions_are_rejected() {
        let left = Point::new(0.0, 273.5);
        let right = Point::new(189.0, 0.0);
        assert!(matches!(
            grid_counts_from_positions(left, right, 21.0),
            Err(PageError::MalformedGeometry(_))
        ));
    }

    #[test]
    fn safe_area_keeps_two_cells_clear() {
        let paper = PaperSize::new(210, 297);
        let size = 21.0;
        // Right marker fixed at the top-right default cell.
        let right_bbox = Rect::new(189.0, 0.0, size, size);
        let area = safe_area(MarkerSlot::Left, right_bbox, paper, size);
        assert!((area.x - 0.0).abs() < f64::EPSILON);
        assert!((area.y - 42.0).abs() < f64::EPSILON);
        assert!((area.width - 168.0).abs() < f64::EPSILON);
        // 14 cells tall minus the fixed marker row and the two-cell buffer.
        assert!((area.height - (14.0 * size - 42.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn excluded_region_spans_both_markers() {
        let left = Rect::new(0.0, 273.0, 21.0, 21.0);
        let right = Rect::new(189.0, 0.0, 21.0, 21.0);
        let zone = excluded_region(left, right, 21.0);
        assert!((zone.x - 0.0).abs() < f64::EPSILON);
        assert!((zone.y - 0.0).abs() < f64::EPSILON);
        assert!((zone.width - 210.0).abs() < f64::EPSILON);
        assert!((zone.height - 294.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snap_rounds_then_clamps() {
        assert!((snap_to_cell(31.0, 21.0, 0.0, 210.0) - 42.0).abs() < f64::EPSILON);
        assert!((snap_to_cell(-8.0, 21.0, 0.0, 210.0) - 0.0).abs() < f64::EPSILON);
        assert!((snap_to_cell(250.0, 21.0, 0.0, 210.0) - 189.0).abs() < f64::EPSILON);
    }

    #[test]
    fn local_grid_round_trip() {
        let anchor = 42.0;
        for local in [-250_i64, -1, 0, 1, 100, 731] {
            let page = local_to_page(local, anchor);
            // One local unit is 0.21mm, so rounding to whole mm loses up to
            // two units of precision either way.
            assert!((page_to_local(page, anchor) - local).abs() <= 3);
        }
        assert_eq!(local_to_page(100, 0.0), 21);
        assert_eq!(page_to_local(21, 0.0), 100);
    }
}
