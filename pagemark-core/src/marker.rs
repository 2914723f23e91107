//! The two position markers and their drag/snap behaviour.
//!
//! The left marker encodes the page key, the right marker encodes the grid
//! dimension code. Both are squares of identical edge length sitting on a
//! whole-marker grid; dragging one snaps to that grid and is confined to the
//! safe area derived from the other marker's position.

use crate::error::PageResult;
use crate::geometry::{
    self, PageGeometry, PaperSize, Point, Rect, dimension_code, excluded_region,
    grid_counts_from_positions, marker_size, module_size, safe_area, snap_to_cell,
};
pub use crate::geometry::MarkerSlot;
use crate::pattern::{PatternGenerator, PatternGrid};
use crate::MARKER_MARGIN;

/// One of the two position markers.
#[derive(Debug, Clone)]
pub struct Marker {
    /// Which corner role this marker plays.
    pub slot: MarkerSlot,
    /// Top-left corner in page mm.
    pub origin: Point,
    /// The rendered module pattern.
    pub pattern: PatternGrid,
}

impl Marker {
    /// Bounding box at the marker's current position.
    #[must_use]
    pub fn bbox(&self, marker_size: f64) -> Rect {
        Rect::new(self.origin.x, self.origin.y, marker_size, marker_size)
    }
}

/// In-progress marker drag state.
#[derive(Debug, Clone, Copy)]
struct MarkerDrag {
    slot: MarkerSlot,
    /// Pointer offset from the marker's origin at press time.
    offset: Point,
    /// Precomputed once at drag start; bbox lookups during moves are too
    /// slow to repeat per event.
    safe: Rect,
}

/// Owns both markers: placement, dragging and pattern regeneration.
#[derive(Debug, Clone)]
pub struct MarkerPair {
    left: Marker,
    right: Marker,
    marker_size: f64,
    module_size: f64,
    excluded: Rect,
    paper: PaperSize,
    drag: Option<MarkerDrag>,
}

impl MarkerPair {
    /// Place both markers at their deterministic default corners: the left
    /// marker in the bottom-left grid cell, the right in the top-right.
    ///
    /// `page_key` is usually absent at this point; the key pattern starts
    /// blank and is regenerated via [`MarkerPair::apply_page_key`] once the
    /// server assigns one.
    #[must_use]
    pub fn place_initial(
        paper: PaperSize,
        generator: &dyn PatternGenerator,
        page_key: Option<&str>,
    ) -> Self {
        let left_pattern = generator.generate(page_key.unwrap_or(""));
        let size = marker_size(&left_pattern, MARKER_MARGIN);
        let modules = module_size(&left_pattern, MARKER_MARGIN);
        let (num_x, num_y) = geometry::grid_counts(paper, size);
        let right_pattern = generator.generate(&dimension_code(num_x, num_y));

        let left = Marker {
            slot: MarkerSlot::Left,
            origin: Point::new(0.0, size * f64::from(num_y - 1)),
            pattern: left_pattern,
        };
        let right = Marker {
            slot: MarkerSlot::Right,
            origin: Point::new(size * f64::from(num_x - 1), 0.0),
            pattern: right_pattern,
        };
        let excluded = excluded_region(left.bbox(size), right.bbox(size), size);
        Self {
            left,
            right,
            marker_size: size,
            module_size: modules,
            excluded,
            paper,
            drag: None,
        }
    }

    /// Rebuild the pair from persisted geometry.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::MalformedGeometry`] when the stored corners do
    /// not resolve to whole grid counts; such pages are rejected outright
    /// rather than silently repaired.
    pub fn from_saved(
        paper: PaperSize,
        generator: &dyn PatternGenerator,
        page_key: &str,
        left_origin: Point,
        right_origin: Point,
    ) -> PageResult<Self> {
        let left_pattern = generator.generate(page_key);
        let size = marker_size(&left_pattern, MARKER_MARGIN);
        let modules = module_size(&left_pattern, MARKER_MARGIN);
        let (num_x, num_y) = grid_counts_from_positions(left_origin, right_origin, size)?;
        let right_pattern = generator.generate(&dimension_code(num_x, num_y));

        let left = Marker {
            slot: MarkerSlot::Left,
            origin: left_origin,
            pattern: left_pattern,
        };
        let right = Marker {
            slot: MarkerSlot::Right,
            origin: right_origin,
            pattern: right_pattern,
        };
        let excluded = excluded_region(left.bbox(size), right.bbox(size), size);
        Ok(Self {
            left,
            right,
            marker_size: size,
            module_size: modules,
            excluded,
            paper,
            drag: None,
        })
    }

    /// The left (key) marker.
    #[must_use]
    pub fn left(&self) -> &Marker {
        &self.left
    }

    /// The right (dimension) marker.
    #[must_use]
    pub fn right(&self) -> &Marker {
        &self.right
    }

    /// Shared whole-marker edge length in mm.
    #[must_use]
    pub fn marker_size(&self) -> f64 {
        self.marker_size
    }

    /// Edge length of one pattern module in mm.
    #[must_use]
    pub fn module_size(&self) -> f64 {
        self.module_size
    }

    /// The current no-content region spanning both markers.
    #[must_use]
    pub fn excluded(&self) -> Rect {
        self.excluded
    }

    /// Which marker is being dragged, if any.
    #[must_use]
    pub fn dragging(&self) -> Option<MarkerSlot> {
        self.drag.map(|d| d.slot)
    }

    /// The stored geometry for page create/update requests.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn geometry(&self) -> PageGeometry {
        PageGeometry {
            width: self.paper.width,
            height: self.paper.height,
            left_x: self.left.origin.x.round() as i64,
            left_y: self.left.origin.y.round() as i64,
            right_x: self.right.origin.x.round() as i64,
            right_y: self.right.origin.y.round() as i64,
        }
    }

    /// Which marker contains the point, the left marker winning ties.
    #[must_use]
    pub fn hit_test(&self, point: Point) -> Option<MarkerSlot> {
        if self.left.bbox(self.marker_size).contains(point) {
            Some(MarkerSlot::Left)
        } else if self.right.bbox(self.marker_size).contains(point) {
            Some(MarkerSlot::Right)
        } else {
            None
        }
    }

    /// Begin dragging the marker under `point`. Returns the safe area the
    /// host should reveal as a drag overlay, or `None` when no marker was
    /// hit or a drag is already active.
    pub fn start_drag(&mut self, point: Point) -> Option<Rect> {
        if self.drag.is_some() {
            return None;
        }
        let slot = self.hit_test(point)?;
        let (moving, other) = match slot {
            MarkerSlot::Left => (&self.left, &self.right),
            MarkerSlot::Right => (&self.right, &self.left),
        };
        let safe = safe_area(slot, other.bbox(self.marker_size), self.paper, self.marker_size);
        self.drag = Some(MarkerDrag {
            slot,
            offset: Point::new(point.x - moving.origin.x, point.y - moving.origin.y),
            safe,
        });
        Some(safe)
    }

    /// Move the dragged marker: pointer minus press offset, snapped to the
    /// whole-marker grid per axis, clamped into the safe area. Position-only;
    /// pattern regeneration waits for [`MarkerPair::regenerate_dimension_pattern`].
    pub fn drag(&mut self, point: Point) {
        let Some(drag) = self.drag else { return };
        let x = snap_to_cell(
            point.x - drag.offset.x,
            self.marker_size,
            drag.safe.x,
            drag.safe.right(),
        );
        let y = snap_to_cell(
            point.y - drag.offset.y,
            self.marker_size,
            drag.safe.y,
            drag.safe.bottom(),
        );
        let moving = match drag.slot {
            MarkerSlot::Left => &mut self.left,
            MarkerSlot::Right => &mut self.right,
        };
        moving.origin = Point::new(x, y);
    }

    /// Finish the active drag: hides overlays (host side), recomputes the
    /// no-content region and returns the geometry to persist. Regenerating
    /// the dimension pattern is deferred to the caller's next tick so the
    /// drag-end render can settle first.
    pub fn end_drag(&mut self) -> Option<PageGeometry> {
        self.drag.take()?;
        self.excluded = excluded_region(
            self.left.bbox(self.marker_size),
            self.right.bbox(self.marker_size),
            self.marker_size,
        );
        Some(self.geometry())
    }

    /// Regenerate the right marker's dimension pattern from the current
    /// positions, replacing only that pattern in place.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::MalformedGeometry`] if the current positions do
    /// not resolve to whole grid counts (cannot happen after a grid-snapped
    /// drag; defends the persisted-state path).
    pub fn regenerate_dimension_pattern(
        &mut self,
        generator: &dyn PatternGenerator,
    ) -> PageResult<()> {
        let (num_x, num_y) =
            grid_counts_from_positions(self.left.origin, self.right.origin, self.marker_size)?;
        self.right.pattern = generator.generate(&dimension_code(num_x, num_y));
        tracing::debug!("Regenerated dimension marker: {num_x}x{num_y}");
        Ok(())
    }

    /// Replace the key marker's pattern once the server-assigned page key
    /// arrives. The pattern started blank, so only the modules change; the
    /// marker's size and position stay put.
    pub fn apply_page_key(&mut self, page_key: &str, generator: &dyn PatternGenerator) {
        self.left.pattern = generator.generate(page_key);
    }

    /// The current dimension code string.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::MalformedGeometry`] for unresolvable positions.
    pub fn dimension_code(&self) -> PageResult<String> {
        let (num_x, num_y) =
            grid_counts_from_positions(self.left.origin, self.right.origin, self.marker_size)?;
        Ok(dimension_code(num_x, num_y))
    }
}
