//! Annotation elements: checkable tick boxes and audio regions.
//!
//! Tick boxes are created optimistically with a client temp id and live
//! entirely in page mm. The snap grid is derived state — the distinct x and y
//! coordinates of current box corners — rebuilt after every structural
//! change and consulted only during drags.

use serde::{Deserialize, Serialize};

use crate::error::{PageError, PageResult};
use crate::geometry::{PaperSize, Point, Rect};
use crate::{BOX_STROKE_WIDTH, SNAP_DISTANCE};

/// Two-phase entity identity: client-assigned until the server acknowledges
/// creation, permanent afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityId {
    /// Client-assigned transient id, retired on acknowledgement.
    Pending(u64),
    /// Server-assigned permanent id.
    Confirmed(i64),
}

impl EntityId {
    /// The permanent id, if the server has assigned one.
    #[must_use]
    pub fn confirmed(&self) -> Option<i64> {
        match self {
            Self::Confirmed(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }
}

/// A checkable box, positioned by its top-left corner in page mm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickBox {
    /// Two-phase identity.
    pub id: EntityId,
    /// Top-left corner in mm.
    pub origin: Point,
    /// Item description shown to the scanner, default empty.
    pub description: String,
    /// Order quantity, default 1, always positive.
    pub quantity: u32,
    /// Whether the box is highlighted as the current selection.
    pub selected: bool,
}

impl TickBox {
    /// Bounding box at the current position.
    #[must_use]
    pub fn bbox(&self, size: f64) -> Rect {
        Rect::new(self.origin.x, self.origin.y, size, size)
    }
}

/// Creation acknowledgement payload: the permanent id, the temp id it
/// replaces, and the coordinates the server stored at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoxAck {
    /// Server-assigned id.
    pub id: i64,
    /// The client temp id this acknowledges.
    #[serde(rename = "tempId")]
    pub temp_id: u64,
    /// Centre X the server stored, in mm.
    pub x: i64,
    /// Centre Y the server stored, in mm.
    pub y: i64,
}

/// A corrective position update owed after reconciliation, because the box
/// moved again before its id arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectiveUpdate {
    /// Confirmed box id.
    pub id: i64,
    /// Current centre X in mm.
    pub x: i64,
    /// Current centre Y in mm.
    pub y: i64,
}

/// What a finished box drag owes the server.
#[derive(Debug, Clone, Copy)]
pub struct DragCommit {
    /// Index of the released box.
    pub index: usize,
    /// Position update to dispatch, when the box has a confirmed id and
    /// actually moved.
    pub update: Option<CorrectiveUpdate>,
}

#[derive(Debug, Clone, Copy)]
struct BoxDrag {
    index: usize,
    offset: Point,
    moved: bool,
}

/// The mutable collection of tick boxes plus the derived snap grid.
#[derive(Debug, Clone)]
pub struct TickBoxLayer {
    boxes: Vec<TickBox>,
    snap_xs: Vec<f64>,
    snap_ys: Vec<f64>,
    box_size: f64,
    paper: PaperSize,
    next_temp_id: u64,
    drag: Option<BoxDrag>,
}

impl TickBoxLayer {
    /// Create an empty layer for the given paper and fixed box size.
    #[must_use]
    pub fn new(paper: PaperSize, box_size: f64) -> Self {
        Self {
            boxes: Vec::new(),
            snap_xs: Vec::new(),
            snap_ys: Vec::new(),
            box_size,
            paper,
            next_temp_id: 1,
            drag: None,
        }
    }

    /// Fixed box edge length in mm.
    #[must_use]
    pub fn box_size(&self) -> f64 {
        self.box_size
    }

    /// All boxes, in insertion order.
    #[must_use]
    pub fn boxes(&self) -> &[TickBox] {
        &self.boxes
    }

    /// A box by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TickBox> {
        self.boxes.get(index)
    }

    /// Centre of a box in mm.
    #[must_use]
    pub fn center(&self, index: usize) -> Option<Point> {
        self.boxes
            .get(index)
            .map(|b| b.bbox(self.box_size).center())
    }

    /// Clamp an origin so the whole box (plus half its stroke on each side)
    /// stays on the paper; each axis clamps independently.
    fn clamp_origin(&self, origin: Point) -> Point {
        let correction = BOX_STROKE_WIDTH / 2.0;
        let max_x = f64::from(self.paper.width) - self.box_size - correction;
        let max_y = f64::from(self.paper.height) - self.box_size - correction;
        Point::new(
            origin.x.max(correction).min(max_x),
            origin.y.max(correction).min(max_y),
        )
    }

    /// Add a new box centred at `center` (the box, not the point, is kept on
    /// the page). Returns its index; the caller dispatches the creation
    /// request carrying the box's temp id.
    pub fn add(&mut self, center: Point) -> usize {
        let origin = self.clamp_origin(Point::new(
            center.x - self.box_size / 2.0,
            center.y - self.box_size / 2.0,
        ));
        let temp_id = self.next_temp_id;
        self.next_temp_id += 1;
        self.boxes.push(TickBox {
            id: EntityId::Pending(temp_id),
            origin,
            description: String::new(),
            quantity: 1,
            selected: false,
        });
        self.rebuild_snap_grid();
        self.boxes.len() - 1
    }

    /// Add a box loaded from persisted state (already server-confirmed).
    pub fn load(&mut self, center: Point, id: i64, description: String, quantity: u32) -> usize {
        let index = self.add(center);
        let tick_box = &mut self.boxes[index];
        tick_box.id = EntityId::Confirmed(id);
        tick_box.description = description;
        tick_box.quantity = quantity.max(1);
        index
    }

    /// A box's transient id, while it still has one.
    #[must_use]
    pub fn temp_id(&self, index: usize) -> Option<u64> {
        match self.boxes.get(index)?.id {
            EntityId::Pending(temp_id) => Some(temp_id),
            EntityId::Confirmed(_) => None,
        }
    }

    /// The topmost box containing `point` (later boxes draw on top).
    #[must_use]
    pub fn hit_test(&self, point: Point) -> Option<usize> {
        self.boxes
            .iter()
            .rposition(|b| b.bbox(self.box_size).contains(point))
    }

    /// Begin dragging a box. Marks it as the current selection and clears
    /// the highlight on every other box.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn start_drag(&mut self, index: usize, point: Point) -> PageResult<()> {
        let origin = self
            .boxes
            .get(index)
            .ok_or(PageError::AnnotationNotFound(index))?
            .origin;
        for (i, b) in self.boxes.iter_mut().enumerate() {
            b.selected = i == index;
        }
        self.drag = Some(BoxDrag {
            index,
            offset: Point::new(point.x - origin.x, point.y - origin.y),
            moved: false,
        });
        Ok(())
    }

    /// Move the dragged box: per axis, the first snap-grid coordinate within
    /// [`SNAP_DISTANCE`] wins (scan order = grid insertion order), then the
    /// edge clamp applies.
    pub fn drag(&mut self, point: Point) {
        let Some(drag) = &mut self.drag else { return };
        let mut x = point.x - drag.offset.x;
        let mut y = point.y - drag.offset.y;
        drag.moved = true;

        if let Some(near) = self.snap_xs.iter().find(|n| (x - **n).abs() < SNAP_DISTANCE) {
            x = *near;
        }
        if let Some(near) = self.snap_ys.iter().find(|n| (y - **n).abs() < SNAP_DISTANCE) {
            y = *near;
        }

        let index = drag.index;
        let origin = self.clamp_origin(Point::new(x, y));
        if let Some(b) = self.boxes.get_mut(index) {
            b.origin = origin;
        }
    }

    /// Finish the active drag: rebuilds the snap grid and reports whether a
    /// position update is owed (confirmed id, actually moved).
    pub fn end_drag(&mut self) -> Option<DragCommit> {
        let drag = self.drag.take()?;
        self.rebuild_snap_grid();
        let update = self.boxes.get(drag.index).and_then(|b| {
            let id = b.id.confirmed()?;
            if !drag.moved {
                return None;
            }
            let center = b.bbox(self.box_size).center();
            Some(CorrectiveUpdate {
                id,
                x: round_mm(center.x),
                y: round_mm(center.y),
            })
        });
        Some(DragCommit {
            index: drag.index,
            update,
        })
    }

    /// Update a box's description and quantity. The quantity string parses
    /// as a positive integer with an implicit default of 1. Returns the
    /// update payload when something changed and the id is confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn edit(
        &mut self,
        index: usize,
        description: &str,
        quantity: &str,
    ) -> PageResult<Option<(CorrectiveUpdate, String, u32)>> {
        let quantity = quantity.parse::<u32>().ok().filter(|q| *q > 0).unwrap_or(1);
        let size = self.box_size;
        let tick_box = self
            .boxes
            .get_mut(index)
            .ok_or(PageError::AnnotationNotFound(index))?;
        if tick_box.description == description && tick_box.quantity == quantity {
            return Ok(None);
        }
        tick_box.description = description.to_string();
        tick_box.quantity = quantity;
        let Some(id) = tick_box.id.confirmed() else {
            // Nothing to target on the server yet; the local edit stands and
            // will ride along with the corrective update after the id lands.
            return Ok(None);
        };
        let center = tick_box.bbox(size).center();
        Ok(Some((
            CorrectiveUpdate {
                id,
                x: round_mm(center.x),
                y: round_mm(center.y),
            },
            description.to_string(),
            quantity,
        )))
    }

    /// Remove a box. Only permitted once the server has confirmed its id;
    /// removal is optimistic (local state drops the box as soon as the
    /// delete request is on its way). Returns the confirmed id to delete.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PendingEntity`] when the box still has a temp id
    /// and [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn remove(&mut self, index: usize) -> PageResult<i64> {
        let id = self
            .boxes
            .get(index)
            .ok_or(PageError::AnnotationNotFound(index))?
            .id
            .confirmed()
            .ok_or(PageError::PendingEntity)?;
        self.boxes.remove(index);
        self.rebuild_snap_grid();
        Ok(id)
    }

    /// Move a box by a 1 mm keyboard step, clamped to the page edges.
    /// Returns the update payload when the centre actually changed.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PendingEntity`] for boxes without a confirmed id
    /// and [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn nudge(&mut self, index: usize, dx: f64, dy: f64) -> PageResult<Option<CorrectiveUpdate>> {
        let size = self.box_size;
        let correction = BOX_STROKE_WIDTH / 2.0;
        let max_x = f64::from(self.paper.width) - size - correction;
        let max_y = f64::from(self.paper.height) - size - correction;
        let tick_box = self
            .boxes
            .get_mut(index)
            .ok_or(PageError::AnnotationNotFound(index))?;
        let id = tick_box.id.confirmed().ok_or(PageError::PendingEntity)?;
        let before = tick_box.origin;
        tick_box.origin = Point::new(
            (before.x + dx).max(correction).min(max_x),
            (before.y + dy).max(correction).min(max_y),
        );
        if tick_box.origin == before {
            return Ok(None);
        }
        let center = tick_box.bbox(size).center();
        Ok(Some(CorrectiveUpdate {
            id,
            x: round_mm(center.x),
            y: round_mm(center.y),
        }))
    }

    /// Clear every selection highlight.
    pub fn clear_selection(&mut self) {
        for b in &mut self.boxes {
            b.selected = false;
        }
    }

    /// Reconcile a creation acknowledgement: the box whose temp id matches
    /// gains its permanent id, and if the user moved it again before the id
    /// arrived — earlier update attempts had no valid id to target — exactly
    /// one corrective update is owed.
    pub fn reconcile(&mut self, ack: BoxAck) -> Option<CorrectiveUpdate> {
        let size = self.box_size;
        let tick_box = self
            .boxes
            .iter_mut()
            .find(|b| b.id == EntityId::Pending(ack.temp_id))?;
        tick_box.id = EntityId::Confirmed(ack.id);
        let center = tick_box.bbox(size).center();
        let (x, y) = (round_mm(center.x), round_mm(center.y));
        if x == ack.x && y == ack.y {
            None
        } else {
            tracing::debug!(
                "Box {} moved before its id arrived; issuing corrective update",
                ack.id
            );
            Some(CorrectiveUpdate { id: ack.id, x, y })
        }
    }

    /// Rebuild the snap grid from every box's corner coordinates,
    /// deduplicated, in insertion order.
    pub fn rebuild_snap_grid(&mut self) {
        self.snap_xs.clear();
        self.snap_ys.clear();
        for b in &self.boxes {
            if !self.snap_xs.iter().any(|x| (x - b.origin.x).abs() < f64::EPSILON) {
                self.snap_xs.push(b.origin.x);
            }
            if !self.snap_ys.iter().any(|y| (y - b.origin.y).abs() < f64::EPSILON) {
                self.snap_ys.push(b.origin.y);
            }
        }
    }
}

/// An audio region in absolute page mm. Created only after a server round
/// trip, so the id is always permanent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArea {
    /// Server-assigned id.
    pub id: i64,
    /// Bounding rectangle in mm.
    pub rect: Rect,
    /// The attached sound clip.
    #[serde(rename = "soundClipId")]
    pub sound_clip_id: i64,
}

#[allow(clippy::cast_possible_truncation)]
fn round_mm(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> TickBoxLayer {
        // A 40mm box on A4, mirroring a 7-cell marker block.
        TickBoxLayer::new(PaperSize::new(210, 297), 40.0)
    }

    #[test]
    fn add_clamps_box_not_point() {
        let mut l = layer();
        let index = l.add(Point::new(0.0, 0.0));
        let b = l.get(index).unwrap();
        assert!((b.origin.x - 0.25).abs() < f64::EPSILON);
        assert!((b.origin.y - 0.25).abs() < f64::EPSILON);

        let index = l.add(Point::new(500.0, 500.0));
        let b = l.get(index).unwrap();
        assert!((b.origin.x - (210.0 - 40.25)).abs() < f64::EPSILON);
        assert!((b.origin.y - (297.0 - 40.25)).abs() < f64::EPSILON);
    }

    #[test]
    fn snap_is_idempotent_within_threshold() {
        let mut l = layer();
        l.add(Point::new(100.0, 100.0));
        let anchor = l.get(0).unwrap().origin;

        // From two different starting points, a drag ending within 3mm of
        // the anchored column lands on exactly the same coordinate.
        let second = l.add(Point::new(160.0, 200.0));
        l.start_drag(second, l.center(second).unwrap()).unwrap();
        l.drag(Point::new(anchor.x + 20.0 + 2.0, 200.0));
        assert!((l.get(second).unwrap().origin.x - anchor.x).abs() < f64::EPSILON);

        l.drag(Point::new(anchor.x + 20.0 - 2.5, 180.0));
        assert!((l.get(second).unwrap().origin.x - anchor.x).abs() < f64::EPSILON);
        l.end_drag();
    }

    #[test]
    fn end_drag_reports_update_only_for_confirmed_movers() {
        let mut l = layer();
        let index = l.add(Point::new(100.0, 100.0));

        // Pending id: moved, but nothing to target on the server.
        l.start_drag(index, l.center(index).unwrap()).unwrap();
        l.drag(Point::new(150.0, 150.0));
        let commit = l.end_drag().unwrap();
        assert!(commit.update.is_none());

        // Confirmed id and moved: update owed.
        l.reconcile(BoxAck {
            id: 9,
            temp_id: 1,
            x: 150,
            y: 150,
        });
        l.start_drag(index, l.center(index).unwrap()).unwrap();
        l.drag(Point::new(80.0, 90.0));
        let commit = l.end_drag().unwrap();
        let update = commit.update.unwrap();
        assert_eq!(update.id, 9);

        // Confirmed but not moved: no update.
        l.start_drag(index, l.center(index).unwrap()).unwrap();
        let commit = l.end_drag().unwrap();
        assert!(commit.update.is_none());
    }

    #[test]
    fn reconcile_issues_exactly_one_corrective_update() {
        let mut l = layer();
        let index = l.add(Point::new(100.0, 100.0));

        // User drags before the server id arrives.
        l.start_drag(index, l.center(index).unwrap()).unwrap();
        l.drag(Point::new(140.0, 130.0));
        l.end_drag();

        let ack = BoxAck {
            id: 7,
            temp_id: 1,
            x: 100,
            y: 100,
        };
        let correction = l.reconcile(ack).expect("box moved since creation");
        assert_eq!(correction.id, 7);
        assert_eq!(correction.x, 140);
        assert_eq!(correction.y, 130);
        assert_eq!(l.get(index).unwrap().id, EntityId::Confirmed(7));

        // A duplicate ack finds no pending box: no second correction.
        assert!(l.reconcile(ack).is_none());
    }

    #[test]
    fn reconcile_is_silent_when_position_matches() {
        let mut l = layer();
        l.add(Point::new(100.0, 100.0));
        let ack = BoxAck {
            id: 3,
            temp_id: 1,
            x: 100,
            y: 100,
        };
        assert!(l.reconcile(ack).is_none());
    }

    #[test]
    fn remove_requires_confirmed_id() {
        let mut l = layer();
        let index = l.add(Point::new(100.0, 100.0));
        assert!(matches!(l.remove(index), Err(PageError::PendingEntity)));
        l.reconcile(BoxAck {
            id: 4,
            temp_id: 1,
            x: 100,
            y: 100,
        });
        assert_eq!(l.remove(index).unwrap(), 4);
        assert!(l.boxes().is_empty());
    }

    #[test]
    fn nudge_clamps_and_skips_noop_updates() {
        let mut l = layer();
        let index = l.load(Point::new(20.25, 100.0), 5, String::new(), 1);
        // Already against the left edge; a further left nudge is a no-op.
        assert!(l.nudge(index, -1.0, 0.0).unwrap().is_none());
        let update = l.nudge(index, 1.0, 0.0).unwrap().unwrap();
        assert_eq!(update.id, 5);
        assert_eq!(update.x, 21);
    }

    #[test]
    fn edit_defaults_quantity_to_one() {
        let mut l = layer();
        let index = l.load(Point::new(100.0, 100.0), 2, String::new(), 1);
        let (update, description, quantity) = l
            .edit(index, "paper clips", "not-a-number")
            .unwrap()
            .unwrap();
        assert_eq!(update.id, 2);
        assert_eq!(description, "paper clips");
        assert_eq!(quantity, 1);
        // Unchanged values produce no request.
        assert!(l.edit(index, "paper clips", "1").unwrap().is_none());
    }
}
