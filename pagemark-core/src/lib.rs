//! # Pagemark Core
//!
//! Layout and synchronization engine for paper documents carrying two
//! position-encoding markers. A mobile scanner photographing any fragment of
//! a printed page can recover where on the page it is looking (from the
//! dimension marker) and which page it is (from the key marker).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               pagemark-core                 │
//! ├─────────────────────────────────────────────┤
//! │  EditorSession   │  InputHandler            │
//! │  - markers       │  - pointer state machine │
//! │  - tick boxes    │  - keyboard nudge/delete │
//! │  - audio areas   │  - deferred regeneration │
//! ├─────────────────────────────────────────────┤
//! │  GeometryModel   │  SyncClient              │
//! │  - safe areas    │  - in-flight call table  │
//! │  - grid counts   │  - connectivity timeouts │
//! │  - mm ↔ grid     │  - temp-id reconciliation│
//! └─────────────────────────────────────────────┘
//! ```
//!
//! All mutation is single-threaded and event-driven: the host feeds pointer
//! and keyboard events in, mutations apply to local state immediately, and
//! the corresponding server request is handed to a fire-and-forget
//! [`Transport`]. Acknowledgements arrive later (in any order) and are
//! reconciled against the current state, never the state at dispatch time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod annotation;
pub mod background;
pub mod error;
pub mod geometry;
pub mod input;
pub mod marker;
pub mod pattern;
pub mod session;
pub mod sync;

pub use annotation::{AudioArea, BoxAck, EntityId, TickBox, TickBoxLayer};
pub use background::BackgroundImage;
pub use error::{PageError, PageResult};
pub use geometry::{PageGeometry, PaperSize, Point, Rect};
pub use input::{InputHandler, KeyInput, KeyResponse, PointerState, PressOutcome};
pub use marker::{Marker, MarkerPair, MarkerSlot};
pub use pattern::{HashPattern, PatternGenerator, PatternGrid};
pub use session::{EditorSession, PageConfig, PageType};
pub use sync::{ConnectionId, SyncClient, SyncEvent, SyncRequest, Transport};

/// Core version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long to wait for a call's success signal before warning the user.
pub const CONNECTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Minimum paper edge in mm (both dimensions).
pub const MINIMUM_PAPER_SIZE: u32 = 63;

/// Assumed DPI when resizing uploaded images to their mm size.
pub const DEFAULT_DPI: f64 = 72.0;

/// Modules across one finder block of the key marker; tick boxes are sized
/// to match one block.
pub const MARKER_KEY_CELLS: u32 = 7;

/// Quiet zone around a marker pattern, in mm.
pub const MARKER_MARGIN: f64 = 2.0;

/// Proximity threshold for tick box edge snapping, in mm.
pub const SNAP_DISTANCE: f64 = 3.0;

/// Tick box line width in mm (half falls either side of the outline).
pub const BOX_STROKE_WIDTH: f64 = 0.5;

/// Millimetres represented by 100 local grid units.
pub const GRID_SCALE: f64 = 21.0;

/// Local grid units per marker cell.
pub const GRID_UNITS_PER_CELL: f64 = 100.0;

/// Base name for exported documents (without the .pdf extension).
pub const EXPORT_FILENAME: &str = "pagemark";
