//! The editor session: one page's complete client-side state.
//!
//! An [`EditorSession`] owns the paper, both markers, the tick box layer,
//! audio regions and the page's server identity. Every mutating operation
//! applies locally first and returns the [`SyncRequest`] (if any) that the
//! caller should dispatch; the session never talks to a transport itself.
//!
//! A freshly created page has no key until the server assigns one. Edits
//! that need the key (type changes, marker moves) made during that window
//! are held and flushed as requests when the key arrives.

use serde::{Deserialize, Serialize};

use crate::annotation::{AudioArea, BoxAck, TickBoxLayer};
use crate::background::BackgroundImage;
use crate::error::{PageError, PageResult};
use crate::geometry::{self, PaperSize, Point, Rect};
use crate::marker::MarkerPair;
use crate::pattern::PatternGenerator;
use crate::sync::SyncRequest;
use crate::{BOX_STROKE_WIDTH, MARKER_KEY_CELLS, MINIMUM_PAPER_SIZE};

/// What a scan of this page does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PageType {
    /// No behaviour chosen yet; scans only resolve the page.
    Unset = 0,
    /// Tick boxes are read and submitted as an order.
    Checkbox = 1,
    /// Scanned regions map to audio clips.
    Audio = 2,
}

impl PageType {
    /// Decode a stored type code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Unset),
            1 => Some(Self::Checkbox),
            2 => Some(Self::Audio),
            _ => None,
        }
    }
}

/// A persisted tick box as the server returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedBox {
    /// Server-assigned id.
    pub id: i64,
    /// Centre X in mm.
    pub x: i64,
    /// Centre Y in mm.
    pub y: i64,
    /// Item description.
    #[serde(default)]
    pub description: String,
    /// Order quantity.
    #[serde(default = "default_quantity")]
    pub amount: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A persisted audio region as the server returns it (absolute mm).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAudioArea {
    /// Server-assigned id.
    pub id: i64,
    /// Left edge in mm.
    pub x: i64,
    /// Top edge in mm.
    pub y: i64,
    /// Width in mm.
    pub width: i64,
    /// Height in mm.
    pub height: i64,
    /// Attached sound clip.
    #[serde(rename = "soundClipId")]
    pub sound_clip_id: i64,
}

/// A page's full persisted state, as returned by the server's edit lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// The page key.
    pub page_key: String,
    /// Paper width in mm.
    pub width: u32,
    /// Paper height in mm.
    pub height: u32,
    /// Left marker X in mm.
    pub left_x: i64,
    /// Left marker Y in mm.
    pub left_y: i64,
    /// Right marker X in mm.
    pub right_x: i64,
    /// Right marker Y in mm.
    pub right_y: i64,
    /// Page type code.
    #[serde(rename = "type")]
    pub page_type: u8,
    /// Scan destination, when set.
    #[serde(default)]
    pub destination: Option<String>,
    /// Whether the page has been scanned and locked.
    #[serde(default)]
    pub locked: bool,
    /// Persisted tick boxes.
    #[serde(default)]
    pub boxes: Vec<SavedBox>,
    /// Persisted audio regions.
    #[serde(default)]
    pub audio_areas: Vec<SavedAudioArea>,
}

/// One page's client-side state and the requests its edits owe the server.
#[derive(Debug)]
pub struct EditorSession {
    paper: PaperSize,
    markers: MarkerPair,
    boxes: TickBoxLayer,
    audio_areas: Vec<AudioArea>,
    background: Option<BackgroundImage>,
    page_key: Option<String>,
    page_type: PageType,
    destination: Option<String>,
    locked: bool,
    pending_type: Option<PageType>,
    pending_geometry: bool,
    needs_regeneration: bool,
}

impl EditorSession {
    fn assemble(
        paper: PaperSize,
        markers: MarkerPair,
        background: Option<BackgroundImage>,
    ) -> Self {
        let box_size = f64::from(MARKER_KEY_CELLS) * markers.module_size() - BOX_STROKE_WIDTH;
        Self {
            paper,
            markers,
            boxes: TickBoxLayer::new(paper, box_size),
            audio_areas: Vec::new(),
            background,
            page_key: None,
            page_type: PageType::Unset,
            destination: None,
            locked: false,
            pending_type: None,
            pending_geometry: false,
            needs_regeneration: false,
        }
    }

    /// Start a blank page. The caller dispatches [`EditorSession::creation_request`]
    /// to obtain a page key.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PaperTooSmall`] when either edge is below the
    /// minimum.
    pub fn new_blank(paper: PaperSize, generator: &dyn PatternGenerator) -> PageResult<Self> {
        if paper.width < MINIMUM_PAPER_SIZE || paper.height < MINIMUM_PAPER_SIZE {
            return Err(PageError::PaperTooSmall {
                width: paper.width,
                height: paper.height,
                minimum: MINIMUM_PAPER_SIZE,
            });
        }
        let markers = MarkerPair::place_initial(paper, generator, None);
        Ok(Self::assemble(paper, markers, None))
    }

    /// Start a page from a scanned form, sizing the paper from the image.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PaperTooSmall`] when the derived paper is below
    /// the minimum.
    pub fn new_from_image(
        image: BackgroundImage,
        generator: &dyn PatternGenerator,
    ) -> PageResult<Self> {
        let paper = image.paper_size()?;
        let markers = MarkerPair::place_initial(paper, generator, None);
        Ok(Self::assemble(paper, markers, Some(image)))
    }

    /// Rebuild a session from persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::MalformedGeometry`] when the stored marker
    /// corners do not resolve to whole grid counts.
    pub fn from_saved(config: PageConfig, generator: &dyn PatternGenerator) -> PageResult<Self> {
        let paper = PaperSize::new(config.width, config.height);
        #[allow(clippy::cast_precision_loss)]
        let markers = MarkerPair::from_saved(
            paper,
            generator,
            &config.page_key,
            Point::new(config.left_x as f64, config.left_y as f64),
            Point::new(config.right_x as f64, config.right_y as f64),
        )?;
        let mut session = Self::assemble(paper, markers, None);
        session.page_key = Some(config.page_key);
        session.page_type = PageType::from_code(config.page_type).unwrap_or(PageType::Unset);
        session.destination = config.destination;
        session.locked = config.locked;
        #[allow(clippy::cast_precision_loss)]
        for saved in config.boxes {
            session.boxes.load(
                Point::new(saved.x as f64, saved.y as f64),
                saved.id,
                saved.description,
                saved.amount,
            );
        }
        #[allow(clippy::cast_precision_loss)]
        for saved in config.audio_areas {
            session.audio_areas.push(AudioArea {
                id: saved.id,
                rect: Rect::new(
                    saved.x as f64,
                    saved.y as f64,
                    saved.width as f64,
                    saved.height as f64,
                ),
                sound_clip_id: saved.sound_clip_id,
            });
        }
        Ok(session)
    }

    /// Attach a background image to an existing page.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::ImageRatioMismatch`] when the image cannot back
    /// this paper without distortion.
    pub fn attach_image(&mut self, image: BackgroundImage) -> PageResult<()> {
        image.check_ratio(self.paper)?;
        self.background = Some(image);
        Ok(())
    }

    /// The request that registers this page and obtains its key.
    #[must_use]
    pub fn creation_request(&self) -> SyncRequest {
        let geometry = self.markers.geometry();
        SyncRequest::NewPage {
            width: geometry.width,
            height: geometry.height,
            left_x: geometry.left_x,
            left_y: geometry.left_y,
            right_x: geometry.right_x,
            right_y: geometry.right_y,
        }
    }

    /// Adopt the server-assigned page key: the key marker gains its real
    /// pattern, and any type change or marker move made while the key was
    /// pending is flushed as requests.
    pub fn apply_page_key(
        &mut self,
        key: &str,
        generator: &dyn PatternGenerator,
    ) -> Vec<SyncRequest> {
        self.page_key = Some(key.to_string());
        self.markers.apply_page_key(key, generator);
        let mut flushed = Vec::new();
        if let Some(page_type) = self.pending_type.take() {
            flushed.push(SyncRequest::UpdateType {
                key: key.to_string(),
                page_type,
            });
        }
        if self.pending_geometry {
            self.pending_geometry = false;
            flushed.push(self.geometry_request(key));
        }
        flushed
    }

    fn geometry_request(&self, key: &str) -> SyncRequest {
        let geometry = self.markers.geometry();
        SyncRequest::UpdateGeometry {
            key: key.to_string(),
            left_x: geometry.left_x,
            left_y: geometry.left_y,
            right_x: geometry.right_x,
            right_y: geometry.right_y,
        }
    }

    /// Change the page type. Held until the key arrives if necessary.
    pub fn set_page_type(&mut self, page_type: PageType) -> Option<SyncRequest> {
        self.page_type = page_type;
        match &self.page_key {
            Some(key) => Some(SyncRequest::UpdateType {
                key: key.clone(),
                page_type,
            }),
            None => {
                self.pending_type = Some(page_type);
                None
            }
        }
    }

    /// Change the scan destination. Pages without a key keep the value
    /// locally only; the destination editor is not reachable before the key
    /// arrives.
    pub fn set_destination(&mut self, destination: &str) -> Option<SyncRequest> {
        self.destination = Some(destination.to_string());
        self.page_key.as_ref().map(|key| SyncRequest::UpdateDestination {
            key: key.clone(),
            destination: destination.to_string(),
        })
    }

    /// Begin dragging the marker under `point`; returns the safe-area
    /// overlay rectangle on a hit.
    pub fn begin_marker_drag(&mut self, point: Point) -> Option<Rect> {
        self.markers.start_drag(point)
    }

    /// Move the dragged marker.
    pub fn drag_marker(&mut self, point: Point) {
        self.markers.drag(point);
    }

    /// Finish the marker drag. The dimension pattern regenerates on the next
    /// [`EditorSession::tick`]; the position update goes out now (or waits
    /// for the page key).
    pub fn end_marker_drag(&mut self) -> Option<SyncRequest> {
        self.markers.end_drag()?;
        self.needs_regeneration = true;
        match &self.page_key {
            Some(key) => Some(self.geometry_request(&key.clone())),
            None => {
                self.pending_geometry = true;
                None
            }
        }
    }

    /// Run deferred work: dimension pattern regeneration after a marker
    /// drag. Returns whether anything changed (the host re-renders then).
    ///
    /// # Errors
    ///
    /// Returns [`PageError::MalformedGeometry`] if the marker positions have
    /// become unresolvable, which a grid-snapped drag cannot produce.
    pub fn tick(&mut self, generator: &dyn PatternGenerator) -> PageResult<bool> {
        if !self.needs_regeneration {
            return Ok(false);
        }
        self.needs_regeneration = false;
        self.markers.regenerate_dimension_pattern(generator)?;
        Ok(true)
    }

    /// Add a tick box centred at `center` and build its creation request.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PendingEntity`] while the page itself has no
    /// key; boxes cannot be persisted before the page exists server-side.
    pub fn add_box(&mut self, center: Point) -> PageResult<(usize, SyncRequest)> {
        let key = self.page_key.clone().ok_or(PageError::PendingEntity)?;
        let index = self.boxes.add(center);
        let box_center = self
            .boxes
            .center(index)
            .ok_or(PageError::AnnotationNotFound(index))?;
        let temp_id = self
            .boxes
            .temp_id(index)
            .ok_or(PageError::AnnotationNotFound(index))?;
        Ok((
            index,
            SyncRequest::NewBox {
                key,
                temp_id,
                x: round_mm(box_center.x),
                y: round_mm(box_center.y),
            },
        ))
    }

    /// Begin dragging a tick box.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn begin_box_drag(&mut self, index: usize, point: Point) -> PageResult<()> {
        self.boxes.start_drag(index, point)
    }

    /// Move the dragged tick box.
    pub fn drag_box(&mut self, point: Point) {
        self.boxes.drag(point);
    }

    /// Finish the box drag, producing a position update when one is owed.
    pub fn end_box_drag(&mut self) -> Option<SyncRequest> {
        let commit = self.boxes.end_drag()?;
        let update = commit.update?;
        let key = self.page_key.clone()?;
        let tick_box = self.boxes.get(commit.index)?;
        Some(SyncRequest::UpdateBox {
            key,
            id: update.id,
            x: update.x,
            y: update.y,
            description: tick_box.description.clone(),
            quantity: tick_box.quantity,
        })
    }

    /// Update a box's description and quantity.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn edit_box(
        &mut self,
        index: usize,
        description: &str,
        quantity: &str,
    ) -> PageResult<Option<SyncRequest>> {
        let Some((update, description, quantity)) =
            self.boxes.edit(index, description, quantity)?
        else {
            return Ok(None);
        };
        let Some(key) = self.page_key.clone() else {
            return Ok(None);
        };
        Ok(Some(SyncRequest::UpdateBox {
            key,
            id: update.id,
            x: update.x,
            y: update.y,
            description,
            quantity,
        }))
    }

    /// Remove a box, optimistically, and build its delete request.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PendingEntity`] for boxes without a confirmed
    /// id and [`PageError::AnnotationNotFound`] for an invalid index.
    pub fn remove_box(&mut self, index: usize) -> PageResult<SyncRequest> {
        let key = self.page_key.clone().ok_or(PageError::PendingEntity)?;
        let id = self.boxes.remove(index)?;
        Ok(SyncRequest::DeleteBox { key, id })
    }

    /// Move a box by a keyboard step.
    ///
    /// # Errors
    ///
    /// Propagates the layer's nudge errors.
    pub fn nudge_box(&mut self, index: usize, dx: f64, dy: f64) -> PageResult<Option<SyncRequest>> {
        let Some(update) = self.boxes.nudge(index, dx, dy)? else {
            return Ok(None);
        };
        let Some(key) = self.page_key.clone() else {
            return Ok(None);
        };
        let tick_box = self
            .boxes
            .get(index)
            .ok_or(PageError::AnnotationNotFound(index))?;
        Ok(Some(SyncRequest::UpdateBox {
            key,
            id: update.id,
            x: update.x,
            y: update.y,
            description: tick_box.description.clone(),
            quantity: tick_box.quantity,
        }))
    }

    /// Reconcile a box creation acknowledgement, producing the single
    /// corrective update owed when the box moved before its id arrived.
    pub fn reconcile_box(&mut self, ack: BoxAck) -> Option<SyncRequest> {
        let correction = self.boxes.reconcile(ack)?;
        let key = self.page_key.clone()?;
        let tick_box = self
            .boxes
            .boxes()
            .iter()
            .find(|b| b.id.confirmed() == Some(correction.id))?;
        Some(SyncRequest::UpdateBox {
            key,
            id: correction.id,
            x: correction.x,
            y: correction.y,
            description: tick_box.description.clone(),
            quantity: tick_box.quantity,
        })
    }

    /// Build the request recording an audio region drawn in page mm. The
    /// wire format is local grid units anchored at the markers.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PendingEntity`] while the page has no key.
    pub fn audio_request(&self, rect: Rect, sound_clip_id: i64) -> PageResult<SyncRequest> {
        let key = self.page_key.clone().ok_or(PageError::PendingEntity)?;
        let anchor = geometry::grid_anchor(self.markers.left().origin, self.markers.right().origin);
        Ok(SyncRequest::NewAudio {
            key,
            x: geometry::page_to_local(round_mm(rect.x), anchor.x),
            y: geometry::page_to_local(round_mm(rect.y), anchor.y),
            width: geometry::page_to_local(round_mm(rect.width), 0.0),
            height: geometry::page_to_local(round_mm(rect.height), 0.0),
            sound_clip_id,
        })
    }

    /// Record an audio region confirmed by the server.
    pub fn add_audio(&mut self, area: AudioArea) {
        self.audio_areas.push(area);
    }

    /// The request that copies this page under a fresh key.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::PendingEntity`] while the page has no key.
    pub fn duplicate_request(&self) -> PageResult<SyncRequest> {
        let key = self.page_key.clone().ok_or(PageError::PendingEntity)?;
        Ok(SyncRequest::Duplicate { key })
    }

    /// The paper size.
    #[must_use]
    pub fn paper(&self) -> PaperSize {
        self.paper
    }

    /// The marker pair.
    #[must_use]
    pub fn markers(&self) -> &MarkerPair {
        &self.markers
    }

    /// The tick box layer.
    #[must_use]
    pub fn boxes(&self) -> &TickBoxLayer {
        &self.boxes
    }

    /// Clear tick box selection highlights.
    pub fn clear_box_selection(&mut self) {
        self.boxes.clear_selection();
    }

    /// The audio regions.
    #[must_use]
    pub fn audio_areas(&self) -> &[AudioArea] {
        &self.audio_areas
    }

    /// The background image, if any.
    #[must_use]
    pub fn background(&self) -> Option<&BackgroundImage> {
        self.background.as_ref()
    }

    /// The page key, once assigned.
    #[must_use]
    pub fn page_key(&self) -> Option<&str> {
        self.page_key.as_deref()
    }

    /// The page type.
    #[must_use]
    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    /// The scan destination.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Whether the page has been scanned and locked.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.locked
    }
}

#[allow(clippy::cast_possible_truncation)]
fn round_mm(value: f64) -> i64 {
    value.round() as i64
}
