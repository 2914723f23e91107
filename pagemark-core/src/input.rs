//! Pointer and keyboard event handling.
//!
//! The handler is a small state machine layered over [`EditorSession`]: at
//! most one drag is active at a time, tick boxes sit above the markers for
//! hit testing, and keyboard edits apply to the most recently touched box.
//! While an editor dialog is open, page-level input is suspended.

use crate::error::{PageError, PageResult};
use crate::geometry::{Point, Rect};
use crate::pattern::PatternGenerator;
use crate::session::{EditorSession, PageType};
use crate::sync::SyncRequest;

/// Keyboard nudge step in mm.
const NUDGE_STEP: f64 = 1.0;

/// What the pointer is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerState {
    /// Nothing held.
    Idle,
    /// A marker drag is active.
    DraggingMarker,
    /// A tick box drag is active, by index.
    DraggingBox(usize),
}

/// Keyboard input the page reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Remove the selected box.
    Delete,
    /// Clear the selection.
    Escape,
    /// Nudge the selected box left.
    ArrowLeft,
    /// Nudge the selected box right.
    ArrowRight,
    /// Nudge the selected box up.
    ArrowUp,
    /// Nudge the selected box down.
    ArrowDown,
}

/// Outcome of a key press.
#[derive(Debug)]
pub enum KeyResponse {
    /// The key did not apply (no selection, or a dialog has focus).
    Ignored,
    /// The key was handled; dispatch the request if one is owed.
    Handled(Option<SyncRequest>),
}

/// Outcome of a pointer press.
#[derive(Debug)]
pub enum PressOutcome {
    /// Nothing under the pointer reacted.
    Ignored,
    /// A drag started on an existing tick box.
    BoxDrag,
    /// A marker drag started; reveal this safe-area overlay.
    MarkerDrag(Rect),
    /// A background press on a checkbox page created a new box under the
    /// pointer and started dragging it; dispatch the creation request.
    BoxCreated(SyncRequest),
}

/// Routes host input events into session mutations.
#[derive(Debug)]
pub struct InputHandler {
    state: PointerState,
    selected: Option<usize>,
    dialog_open: bool,
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler {
    /// Create an idle handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: PointerState::Idle,
            selected: None,
            dialog_open: false,
        }
    }

    /// Current pointer state.
    #[must_use]
    pub fn state(&self) -> PointerState {
        self.state
    }

    /// Index of the selected box, if any.
    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Whether an editor dialog currently has focus.
    #[must_use]
    pub fn dialog_open(&self) -> bool {
        self.dialog_open
    }

    /// Press: start a drag on whatever is under the pointer, boxes before
    /// markers. On a checkbox page with a key, a background press creates a
    /// new box under the pointer and starts dragging it.
    ///
    /// # Errors
    ///
    /// Propagates box creation and drag errors; the handler stays idle then.
    pub fn pointer_down(
        &mut self,
        session: &mut EditorSession,
        point: Point,
    ) -> PageResult<PressOutcome> {
        if self.dialog_open || self.state != PointerState::Idle {
            return Ok(PressOutcome::Ignored);
        }
        if let Some(index) = session.boxes().hit_test(point) {
            session.begin_box_drag(index, point)?;
            self.state = PointerState::DraggingBox(index);
            self.selected = Some(index);
            return Ok(PressOutcome::BoxDrag);
        }
        if let Some(safe) = session.begin_marker_drag(point) {
            self.state = PointerState::DraggingMarker;
            return Ok(PressOutcome::MarkerDrag(safe));
        }
        if session.page_type() == PageType::Checkbox && session.page_key().is_some() {
            let (index, request) = session.add_box(point)?;
            session.begin_box_drag(index, point)?;
            self.state = PointerState::DraggingBox(index);
            self.selected = Some(index);
            return Ok(PressOutcome::BoxCreated(request));
        }
        Ok(PressOutcome::Ignored)
    }

    /// Move: forward to whichever drag is active.
    pub fn pointer_move(&mut self, session: &mut EditorSession, point: Point) {
        match self.state {
            PointerState::Idle => {}
            PointerState::DraggingMarker => session.drag_marker(point),
            PointerState::DraggingBox(_) => session.drag_box(point),
        }
    }

    /// Release: finish the active drag and return the update it owes. After
    /// a marker drag the dimension pattern regenerates on the next
    /// [`InputHandler::tick`].
    pub fn pointer_up(&mut self, session: &mut EditorSession) -> Option<SyncRequest> {
        let request = match self.state {
            PointerState::Idle => None,
            PointerState::DraggingMarker => session.end_marker_drag(),
            PointerState::DraggingBox(_) => session.end_box_drag(),
        };
        self.state = PointerState::Idle;
        request
    }

    /// Double-click: open the editor dialog for the box under the pointer.
    /// Returns its index for the host to populate the dialog.
    pub fn double_click(&mut self, session: &EditorSession, point: Point) -> Option<usize> {
        if self.dialog_open {
            return None;
        }
        let index = session.boxes().hit_test(point)?;
        self.dialog_open = true;
        self.selected = Some(index);
        Some(index)
    }

    /// The host closed the editor dialog; page input resumes.
    pub fn dialog_closed(&mut self) {
        self.dialog_open = false;
    }

    /// Handle a key press against the current selection. Escape closes an
    /// open dialog before anything else; other keys are suspended while a
    /// dialog has focus. Deletes and nudges on boxes the server has not
    /// acknowledged yet are dropped silently; there is nothing to target.
    ///
    /// # Errors
    ///
    /// Propagates session errors other than the pending-id case.
    pub fn key(&mut self, session: &mut EditorSession, input: KeyInput) -> PageResult<KeyResponse> {
        match input {
            KeyInput::Escape => {
                if self.dialog_open {
                    self.dialog_open = false;
                } else {
                    self.selected = None;
                    session.clear_box_selection();
                }
                Ok(KeyResponse::Handled(None))
            }
            _ if self.dialog_open => Ok(KeyResponse::Ignored),
            KeyInput::Delete => {
                let Some(index) = self.selected else {
                    return Ok(KeyResponse::Ignored);
                };
                match session.remove_box(index) {
                    Ok(request) => {
                        self.selected = None;
                        Ok(KeyResponse::Handled(Some(request)))
                    }
                    Err(PageError::PendingEntity) => Ok(KeyResponse::Ignored),
                    Err(err) => Err(err),
                }
            }
            KeyInput::ArrowLeft => self.nudge(session, -NUDGE_STEP, 0.0),
            KeyInput::ArrowRight => self.nudge(session, NUDGE_STEP, 0.0),
            KeyInput::ArrowUp => self.nudge(session, 0.0, -NUDGE_STEP),
            KeyInput::ArrowDown => self.nudge(session, 0.0, NUDGE_STEP),
        }
    }

    fn nudge(&mut self, session: &mut EditorSession, dx: f64, dy: f64) -> PageResult<KeyResponse> {
        let Some(index) = self.selected else {
            return Ok(KeyResponse::Ignored);
        };
        match session.nudge_box(index, dx, dy) {
            Ok(request) => Ok(KeyResponse::Handled(request)),
            Err(PageError::PendingEntity) => Ok(KeyResponse::Ignored),
            Err(err) => Err(err),
        }
    }

    /// Run deferred session work (dimension pattern regeneration). Returns
    /// whether the host should re-render.
    ///
    /// # Errors
    ///
    /// Propagates regeneration failures.
    pub fn tick(
        &mut self,
        session: &mut EditorSession,
        generator: &dyn PatternGenerator,
    ) -> PageResult<bool> {
        session.tick(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::BoxAck;
    use crate::geometry::PaperSize;
    use crate::pattern::HashPattern;

    fn keyed_session() -> EditorSession {
        let mut session =
            EditorSession::new_blank(PaperSize::new(210, 297), &HashPattern::default()).unwrap();
        session.apply_page_key("aQz", &HashPattern::default());
        session
    }

    #[test]
    fn box_wins_hit_test_over_marker() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        // Place a box over the left marker's cell.
        let marker_origin = session.markers().left().origin;
        let over_marker = Point::new(marker_origin.x + 2.0, marker_origin.y + 2.0);
        session.add_box(over_marker).unwrap();

        let outcome = handler.pointer_down(&mut session, over_marker).unwrap();
        assert!(matches!(outcome, PressOutcome::BoxDrag));
        assert_eq!(handler.state(), PointerState::DraggingBox(0));
        handler.pointer_up(&mut session);
        assert_eq!(handler.state(), PointerState::Idle);
    }

    #[test]
    fn background_press_creates_and_drags_a_box() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        session.set_page_type(PageType::Checkbox);

        let outcome = handler
            .pointer_down(&mut session, Point::new(100.0, 100.0))
            .unwrap();
        let PressOutcome::BoxCreated(request) = outcome else {
            panic!("expected a box creation, got {outcome:?}");
        };
        assert!(matches!(request, SyncRequest::NewBox { x: 100, y: 100, .. }));
        assert_eq!(handler.state(), PointerState::DraggingBox(0));
        assert_eq!(session.boxes().boxes().len(), 1);

        // The fresh box drags with the pointer; releasing it owes nothing
        // until the server id arrives.
        handler.pointer_move(&mut session, Point::new(120.0, 110.0));
        assert!(handler.pointer_up(&mut session).is_none());
        let center = session.boxes().center(0).unwrap();
        assert!((center.x - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn background_press_needs_a_checkbox_page() {
        let mut handler = InputHandler::new();
        let background = Point::new(100.0, 100.0);

        // Untyped page: nothing to create.
        let mut session = keyed_session();
        assert!(matches!(
            handler.pointer_down(&mut session, background).unwrap(),
            PressOutcome::Ignored
        ));
        assert!(session.boxes().boxes().is_empty());

        // Checkbox page without a key: boxes cannot be persisted yet.
        let mut session =
            EditorSession::new_blank(PaperSize::new(210, 297), &HashPattern::default()).unwrap();
        session.set_page_type(PageType::Checkbox);
        assert!(matches!(
            handler.pointer_down(&mut session, background).unwrap(),
            PressOutcome::Ignored
        ));
        assert!(session.boxes().boxes().is_empty());
        assert_eq!(handler.state(), PointerState::Idle);
    }

    #[test]
    fn marker_drag_regenerates_on_next_tick() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        let origin = session.markers().left().origin;

        let outcome = handler.pointer_down(&mut session, origin).unwrap();
        assert!(matches!(outcome, PressOutcome::MarkerDrag(_)));
        handler.pointer_move(&mut session, Point::new(42.0, 210.0));
        let request = handler.pointer_up(&mut session);
        assert!(matches!(request, Some(SyncRequest::UpdateGeometry { .. })));
        assert!(handler.tick(&mut session, &HashPattern::default()).unwrap());
        assert_eq!(session.markers().dimension_code().unwrap(), "8x11");
    }

    #[test]
    fn delete_removes_the_selected_confirmed_box() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        let (index, _) = session.add_box(Point::new(100.0, 100.0)).unwrap();
        let center = session.boxes().center(index).unwrap();
        handler.pointer_down(&mut session, center).unwrap();
        handler.pointer_up(&mut session);

        // Still pending: delete is dropped.
        assert!(matches!(
            handler.key(&mut session, KeyInput::Delete).unwrap(),
            KeyResponse::Ignored
        ));

        session.reconcile_box(BoxAck {
            id: 6,
            temp_id: 1,
            x: 100,
            y: 100,
        });
        let response = handler.key(&mut session, KeyInput::Delete).unwrap();
        assert!(matches!(
            response,
            KeyResponse::Handled(Some(SyncRequest::DeleteBox { id: 6, .. }))
        ));
        assert!(session.boxes().boxes().is_empty());
        assert!(handler.selected().is_none());
    }

    #[test]
    fn arrows_nudge_the_selection_by_one_millimetre() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        let (index, _) = session.add_box(Point::new(100.0, 100.0)).unwrap();
        session.reconcile_box(BoxAck {
            id: 2,
            temp_id: 1,
            x: 100,
            y: 100,
        });
        let center = session.boxes().center(index).unwrap();
        handler.pointer_down(&mut session, center).unwrap();
        handler.pointer_up(&mut session);

        let response = handler.key(&mut session, KeyInput::ArrowRight).unwrap();
        assert!(matches!(
            response,
            KeyResponse::Handled(Some(SyncRequest::UpdateBox { x: 101, .. }))
        ));
    }

    #[test]
    fn open_dialog_suspends_page_input() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        let (index, _) = session.add_box(Point::new(100.0, 100.0)).unwrap();
        let center = session.boxes().center(index).unwrap();

        assert_eq!(handler.double_click(&session, center), Some(index));
        assert!(handler.dialog_open());
        assert!(matches!(
            handler.pointer_down(&mut session, center).unwrap(),
            PressOutcome::Ignored
        ));
        assert_eq!(handler.state(), PointerState::Idle);
        assert!(matches!(
            handler.key(&mut session, KeyInput::ArrowLeft).unwrap(),
            KeyResponse::Ignored
        ));

        handler.dialog_closed();
        handler.pointer_down(&mut session, center).unwrap();
        assert_eq!(handler.state(), PointerState::DraggingBox(index));
    }

    #[test]
    fn escape_closes_the_dialog_before_clearing_selection() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        let (index, _) = session.add_box(Point::new(100.0, 100.0)).unwrap();
        let center = session.boxes().center(index).unwrap();
        handler.double_click(&session, center);
        assert!(handler.dialog_open());

        // First Escape cancels the dialog and leaves the selection alone.
        let response = handler.key(&mut session, KeyInput::Escape).unwrap();
        assert!(matches!(response, KeyResponse::Handled(None)));
        assert!(!handler.dialog_open());
        assert_eq!(handler.selected(), Some(index));

        // Second Escape clears the selection.
        handler.key(&mut session, KeyInput::Escape).unwrap();
        assert!(handler.selected().is_none());
    }

    #[test]
    fn escape_clears_selection() {
        let mut session = keyed_session();
        let mut handler = InputHandler::new();
        let (index, _) = session.add_box(Point::new(100.0, 100.0)).unwrap();
        let center = session.boxes().center(index).unwrap();
        handler.pointer_down(&mut session, center).unwrap();
        handler.pointer_up(&mut session);
        assert_eq!(handler.selected(), Some(index));

        handler.key(&mut session, KeyInput::Escape).unwrap();
        assert!(handler.selected().is_none());
        assert!(!session.boxes().boxes()[index].selected);
    }
}
