//! SQLite-backed page store.
//!
//! One connection behind a mutex; every row carries creation and
//! modification timestamps in milliseconds and is soft-deleted rather than
//! removed. Audio regions are stored as absolute edges in mm but arrive
//! from scanning clients in local grid units, so the insert path converts
//! against the page's marker anchors.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use pagemark_core::session::{PageConfig, SavedAudioArea, SavedBox};
use pagemark_core::{GRID_SCALE, GRID_UNITS_PER_CELL};

use crate::error::{ServerError, ServerResult};
use crate::key::encode_page_key;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    width       INTEGER NOT NULL,
    height      INTEGER NOT NULL,
    left_x      INTEGER NOT NULL,
    left_y      INTEGER NOT NULL,
    right_x     INTEGER NOT NULL,
    right_y     INTEGER NOT NULL,
    page_type   INTEGER NOT NULL DEFAULT 0,
    locked      INTEGER NOT NULL DEFAULT 0,
    deleted     INTEGER NOT NULL DEFAULT 0,
    created_ms  INTEGER NOT NULL,
    modified_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tickboxes (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id     INTEGER NOT NULL,
    x           INTEGER NOT NULL,
    y           INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    amount      INTEGER NOT NULL DEFAULT 1,
    deleted     INTEGER NOT NULL DEFAULT 0,
    created_ms  INTEGER NOT NULL,
    modified_ms INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS audioareas (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id       INTEGER NOT NULL,
    left          INTEGER NOT NULL,
    top           INTEGER NOT NULL,
    right         INTEGER NOT NULL,
    bottom        INTEGER NOT NULL,
    sound_clip_id INTEGER NOT NULL,
    deleted       INTEGER NOT NULL DEFAULT 0,
    created_ms    INTEGER NOT NULL,
    modified_ms   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS destinations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id     INTEGER NOT NULL,
    destination TEXT NOT NULL,
    deleted     INTEGER NOT NULL DEFAULT 0,
    created_ms  INTEGER NOT NULL,
    modified_ms INTEGER NOT NULL
);
";

/// A page row as stored.
#[derive(Debug, Clone)]
pub struct PageRow {
    /// Row id.
    pub id: i64,
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
    pub page_type: u8,
    /// Whether the page has been scanned.
    pub locked: bool,
}

/// Marker geometry for a page, as sent by create and update requests.
#[derive(Debug, Clone, Copy)]
pub struct PageGeometryRow {
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
}

/// SQLite-backed storage for pages and their annotations.
pub struct PageStore {
    conn: Mutex<Connection>,
}

impl PageStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: &Path) -> ServerResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened page store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> ServerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> ServerResult<T>) -> ServerResult<T> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut conn)
    }

    /// Create a page with the given geometry. New pages start with no type
    /// and unlocked.
    ///
    /// # Errors
    ///
    /// Returns a database error on failure.
    pub fn create_page(&self, geometry: PageGeometryRow) -> ServerResult<i64> {
        let now = now_ms();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pages (width, height, left_x, left_y, right_x, right_y,
                                    page_type, locked, deleted, created_ms, modified_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, ?7, ?7)",
                params![
                    geometry.width,
                    geometry.height,
                    geometry.left_x,
                    geometry.left_y,
                    geometry.right_x,
                    geometry.right_y,
                    now
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch a live page row.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PageNotFound`] if the page does not exist or
    /// has been deleted.
    pub fn get_page(&self, page_id: i64) -> ServerResult<PageRow> {
        self.with_conn(|conn| Self::page_row(conn, page_id))
    }

    fn page_row(conn: &Connection, page_id: i64) -> ServerResult<PageRow> {
        conn.query_row(
            "SELECT id, width, height, left_x, left_y, right_x, right_y, page_type, locked
             FROM pages WHERE id = ?1 AND deleted = 0",
            params![page_id],
            |row| {
                Ok(PageRow {
                    id: row.get(0)?,
                    width: row.get(1)?,
                    height: row.get(2)?,
                    left_x: row.get(3)?,
                    left_y: row.get(4)?,
                    right_x: row.get(5)?,
                    right_y: row.get(6)?,
                    page_type: row.get(7)?,
                    locked: row.get::<_, i64>(8)? != 0,
                })
            },
        )
        .optional()?
        .ok_or(ServerError::PageNotFound)
    }

    fn unlocked_page(conn: &Connection, page_id: i64) -> ServerResult<PageRow> {
        let page = Self::page_row(conn, page_id)?;
        if page.locked {
            return Err(ServerError::PageLocked);
        }
        Ok(page)
    }

    /// Replace a page's paper size and marker geometry.
    ///
    /// # Errors
    ///
    /// Fails if the page is missing or locked.
    pub fn update_geometry(&self, page_id: i64, geometry: PageGeometryRow) -> ServerResult<()> {
        let now = now_ms();
        self.with_conn(|conn| {
            Self::unlocked_page(conn, page_id)?;
            conn.execute(
                "UPDATE pages SET width = ?1, height = ?2, left_x = ?3, left_y = ?4,
                                  right_x = ?5, right_y = ?6, modified_ms = ?7
                 WHERE id = ?8",
                params![
                    geometry.width,
                    geometry.height,
                    geometry.left_x,
                    geometry.left_y,
                    geometry.right_x,
                    geometry.right_y,
                    now,
                    page_id
                ],
            )?;
            Ok(())
        })
    }

    /// Set a page's type code.
    ///
    /// # Errors
    ///
    /// Fails if the code is not a known type or the page is missing or
    /// locked.
    pub fn update_type(&self, page_id: i64, page_type: u8) -> ServerResult<()> {
        if page_type > 2 {
            return Err(ServerError::InvalidPageType);
        }
        let now = now_ms();
        self.with_conn(|conn| {
            Self::unlocked_page(conn, page_id)?;
            conn.execute(
                "UPDATE pages SET page_type = ?1, modified_ms = ?2 WHERE id = ?3",
                params![page_type, now, page_id],
            )?;
            Ok(())
        })
    }

    /// Replace a checkbox page's scan destination.
    ///
    /// # Errors
    ///
    /// Fails if the page is missing, locked, or not a checkbox page.
    pub fn update_destination(&self, page_id: i64, destination: &str) -> ServerResult<()> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::unlocked_page(conn, page_id)?;
            if page.page_type != 1 {
                return Err(ServerError::IncorrectPageType);
            }
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE destinations SET deleted = 1, modified_ms = ?1 WHERE page_id = ?2",
                params![now, page_id],
            )?;
            tx.execute(
                "INSERT INTO destinations (page_id, destination, deleted, created_ms, modified_ms)
                 VALUES (?1, ?2, 0, ?3, ?3)",
                params![page_id, destination, now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Mark a page as scanned. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a database error on failure.
    pub fn lock_page(&self, page_id: i64) -> ServerResult<()> {
        let now = now_ms();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE pages SET locked = 1, modified_ms = ?1 WHERE id = ?2 AND locked = 0",
                params![now, page_id],
            )?;
            Ok(())
        })
    }

    /// Insert a tick box at the given centre in mm.
    ///
    /// # Errors
    ///
    /// Fails unless the page exists, is unlocked and is a checkbox page.
    pub fn insert_box(&self, page_id: i64, x: i64, y: i64) -> ServerResult<i64> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::unlocked_page(conn, page_id)?;
            if page.page_type != 1 {
                return Err(ServerError::IncorrectPageType);
            }
            conn.execute(
                "INSERT INTO tickboxes (page_id, x, y, description, amount,
                                        deleted, created_ms, modified_ms)
                 VALUES (?1, ?2, ?3, '', 1, 0, ?4, ?4)",
                params![page_id, x, y, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update a tick box's position and, when given, its description and
    /// quantity.
    ///
    /// # Errors
    ///
    /// Fails unless the page exists, is unlocked, is a checkbox page and
    /// the box belongs to it.
    pub fn update_box(
        &self,
        page_id: i64,
        box_id: i64,
        x: i64,
        y: i64,
        contents: Option<(&str, u32)>,
    ) -> ServerResult<()> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::unlocked_page(conn, page_id)?;
            if page.page_type != 1 {
                return Err(ServerError::IncorrectPageType);
            }
            Self::check_box_owner(conn, page_id, box_id)?;
            if let Some((description, amount)) = contents {
                conn.execute(
                    "UPDATE tickboxes SET x = ?1, y = ?2, description = ?3, amount = ?4,
                                          modified_ms = ?5
                     WHERE id = ?6",
                    params![x, y, description, amount, now, box_id],
                )?;
            } else {
                conn.execute(
                    "UPDATE tickboxes SET x = ?1, y = ?2, modified_ms = ?3 WHERE id = ?4",
                    params![x, y, now, box_id],
                )?;
            }
            Ok(())
        })
    }

    /// Soft-delete a tick box.
    ///
    /// # Errors
    ///
    /// Fails unless the page exists, is unlocked, is a checkbox page and
    /// the box belongs to it.
    pub fn delete_box(&self, page_id: i64, box_id: i64) -> ServerResult<()> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::unlocked_page(conn, page_id)?;
            if page.page_type != 1 {
                return Err(ServerError::IncorrectPageType);
            }
            Self::check_box_owner(conn, page_id, box_id)?;
            conn.execute(
                "UPDATE tickboxes SET deleted = 1, modified_ms = ?1 WHERE id = ?2",
                params![now, box_id],
            )?;
            Ok(())
        })
    }

    fn check_box_owner(conn: &Connection, page_id: i64, box_id: i64) -> ServerResult<()> {
        let owner: Option<i64> = conn
            .query_row(
                "SELECT page_id FROM tickboxes WHERE id = ?1 AND deleted = 0",
                params![box_id],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            None => Err(ServerError::BoxNotFound),
            Some(owner) if owner != page_id => Err(ServerError::IncorrectPageId),
            Some(_) => Ok(()),
        }
    }

    /// Insert an audio region given in local grid units.
    ///
    /// Scanning clients report regions on locked pages, so this is the one
    /// write that does not require the page to be unlocked.
    ///
    /// # Errors
    ///
    /// Fails unless the page exists and is an audio page.
    pub fn insert_audio(
        &self,
        page_id: i64,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        sound_clip_id: i64,
    ) -> ServerResult<i64> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::page_row(conn, page_id)?;
            if page.page_type != 2 {
                return Err(ServerError::IncorrectPageType);
            }
            let left = local_to_mm(x, page.left_x);
            let top = local_to_mm(y, page.right_y);
            let right = left + local_to_mm(width, 0);
            let bottom = top + local_to_mm(height, 0);
            conn.execute(
                "INSERT INTO audioareas (page_id, left, top, right, bottom, sound_clip_id,
                                         deleted, created_ms, modified_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
                params![page_id, left, top, right, bottom, sound_clip_id, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Copy a page: geometry and type always, boxes and destination for
    /// checkbox pages, audio regions for audio pages when `copy_audio` is
    /// set. The copy starts unlocked.
    ///
    /// # Errors
    ///
    /// Fails if the source page does not exist.
    pub fn duplicate(&self, page_id: i64, copy_audio: bool) -> ServerResult<i64> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::page_row(conn, page_id)?;
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO pages (width, height, left_x, left_y, right_x, right_y,
                                    page_type, locked, deleted, created_ms, modified_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?8)",
                params![
                    page.width,
                    page.height,
                    page.left_x,
                    page.left_y,
                    page.right_x,
                    page.right_y,
                    page.page_type,
                    now
                ],
            )?;
            let new_id = tx.last_insert_rowid();
            match page.page_type {
                1 => {
                    tx.execute(
                        "INSERT INTO tickboxes (page_id, x, y, description, amount,
                                                deleted, created_ms, modified_ms)
                         SELECT ?1, x, y, description, amount, 0, ?2, ?2
                         FROM tickboxes WHERE page_id = ?3 AND deleted = 0",
                        params![new_id, now, page_id],
                    )?;
                    tx.execute(
                        "INSERT INTO destinations (page_id, destination,
                                                   deleted, created_ms, modified_ms)
                         SELECT ?1, destination, 0, ?2, ?2
                         FROM destinations WHERE page_id = ?3 AND deleted = 0",
                        params![new_id, now, page_id],
                    )?;
                }
                2 if copy_audio => {
                    tx.execute(
                        "INSERT INTO audioareas (page_id, left, top, right, bottom,
                                                 sound_clip_id, deleted, created_ms, modified_ms)
                         SELECT ?1, left, top, right, bottom, sound_clip_id, 0, ?2, ?2
                         FROM audioareas WHERE page_id = ?3 AND deleted = 0",
                        params![new_id, now, page_id],
                    )?;
                }
                _ => {}
            }
            tx.commit()?;
            debug!(source = page_id, copy = new_id, "duplicated page");
            Ok(new_id)
        })
    }

    /// Assemble a page's full state.
    ///
    /// With `scale` set, annotation coordinates are converted from mm to
    /// local grid units against the marker anchors; this is the form
    /// scanning clients consume. With `lock` set, a page with a chosen
    /// type is locked as part of the lookup.
    ///
    /// # Errors
    ///
    /// Fails if the page does not exist.
    pub fn lookup(&self, page_id: i64, scale: bool, lock: bool) -> ServerResult<PageConfig> {
        let now = now_ms();
        self.with_conn(|conn| {
            let page = Self::page_row(conn, page_id)?;
            if lock && page.page_type != 0 && !page.locked {
                conn.execute(
                    "UPDATE pages SET locked = 1, modified_ms = ?1 WHERE id = ?2",
                    params![now, page_id],
                )?;
            }
            let destination: Option<String> = conn
                .query_row(
                    "SELECT destination FROM destinations
                     WHERE page_id = ?1 AND deleted = 0
                     ORDER BY id DESC LIMIT 1",
                    params![page_id],
                    |row| row.get(0),
                )
                .optional()?;
            let boxes = Self::boxes(conn, &page, scale)?;
            let audio_areas = Self::audio_areas(conn, &page, scale)?;
            Ok(PageConfig {
                page_key: encode_page_key(page.id),
                width: page.width,
                height: page.height,
                left_x: page.left_x,
                left_y: page.left_y,
                right_x: page.right_x,
                right_y: page.right_y,
                page_type: page.page_type,
                destination,
                locked: page.locked || (lock && page.page_type != 0),
                boxes,
                audio_areas,
            })
        })
    }

    fn boxes(conn: &Connection, page: &PageRow, scale: bool) -> ServerResult<Vec<SavedBox>> {
        let mut stmt = conn.prepare(
            "SELECT id, x, y, description, amount FROM tickboxes
             WHERE page_id = ?1 AND deleted = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![page.id], |row| {
            Ok(SavedBox {
                id: row.get(0)?,
                x: row.get(1)?,
                y: row.get(2)?,
                description: row.get(3)?,
                amount: row.get(4)?,
            })
        })?;
        let mut boxes = Vec::new();
        for row in rows {
            let mut saved = row?;
            if scale {
                saved.x = mm_to_local(saved.x, page.left_x);
                saved.y = mm_to_local(saved.y, page.right_y);
            }
            boxes.push(saved);
        }
        Ok(boxes)
    }

    fn audio_areas(
        conn: &Connection,
        page: &PageRow,
        scale: bool,
    ) -> ServerResult<Vec<SavedAudioArea>> {
        let mut stmt = conn.prepare(
            "SELECT id, left, top, right, bottom, sound_clip_id FROM audioareas
             WHERE page_id = ?1 AND deleted = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![page.id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        let mut areas = Vec::new();
        for row in rows {
            let (id, left, top, right, bottom, sound_clip_id) = row?;
            let area = if scale {
                SavedAudioArea {
                    id,
                    x: mm_to_local(left, page.left_x),
                    y: mm_to_local(top, page.right_y),
                    width: mm_to_local(right - left, 0),
                    height: mm_to_local(bottom - top, 0),
                    sound_clip_id,
                }
            } else {
                SavedAudioArea {
                    id,
                    x: left,
                    y: top,
                    width: right - left,
                    height: bottom - top,
                    sound_clip_id,
                }
            };
            areas.push(area);
        }
        Ok(areas)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Convert a coordinate in local grid units to mm against an anchor.
#[allow(clippy::cast_possible_truncation)]
fn local_to_mm(local: i64, anchor: i64) -> i64 {
    #[allow(clippy::cast_precision_loss)]
    let mm = (local as f64) * GRID_SCALE / GRID_UNITS_PER_CELL;
    mm.round() as i64 + anchor
}

/// Convert a coordinate in mm to local grid units against an anchor.
#[allow(clippy::cast_possible_truncation)]
fn mm_to_local(mm: i64, anchor: i64) -> i64 {
    #[allow(clippy::cast_precision_loss)]
    let local = ((mm - anchor) as f64) / (GRID_SCALE / GRID_UNITS_PER_CELL);
    local.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4_geometry() -> PageGeometryRow {
        PageGeometryRow {
            width: 210,
            height: 297,
            left_x: 0,
            left_y: 273,
            right_x: 189,
            right_y: 0,
        }
    }

    fn checkbox_page(store: &PageStore) -> i64 {
        let id = store.create_page(a4_geometry()).unwrap();
        store.update_type(id, 1).unwrap();
        id
    }

    #[test]
    fn new_pages_are_untyped_and_unlocked() {
        let store = PageStore::in_memory().unwrap();
        let id = store.create_page(a4_geometry()).unwrap();
        let page = store.get_page(id).unwrap();
        assert_eq!(page.page_type, 0);
        assert!(!page.locked);
    }

    #[test]
    fn box_edits_require_checkbox_type() {
        let store = PageStore::in_memory().unwrap();
        let id = store.create_page(a4_geometry()).unwrap();
        assert!(matches!(
            store.insert_box(id, 50, 50),
            Err(ServerError::IncorrectPageType)
        ));
        store.update_type(id, 1).unwrap();
        assert!(store.insert_box(id, 50, 50).is_ok());
    }

    #[test]
    fn scan_lookup_locks_typed_pages_and_rejects_later_edits() {
        let store = PageStore::in_memory().unwrap();
        let id = checkbox_page(&store);
        let box_id = store.insert_box(id, 50, 50).unwrap();

        let config = store.lookup(id, true, true).unwrap();
        assert!(config.locked);
        assert!(matches!(
            store.insert_box(id, 60, 60),
            Err(ServerError::PageLocked)
        ));
        assert!(matches!(
            store.update_box(id, box_id, 55, 55, None),
            Err(ServerError::PageLocked)
        ));
        assert!(matches!(
            store.update_type(id, 2),
            Err(ServerError::PageLocked)
        ));
        assert!(matches!(
            store.update_geometry(id, a4_geometry()),
            Err(ServerError::PageLocked)
        ));
    }

    #[test]
    fn scan_lookup_leaves_untyped_pages_unlocked() {
        let store = PageStore::in_memory().unwrap();
        let id = store.create_page(a4_geometry()).unwrap();
        let config = store.lookup(id, true, true).unwrap();
        assert!(!config.locked);
        assert!(!store.get_page(id).unwrap().locked);
    }

    #[test]
    fn audio_regions_land_on_locked_pages() {
        let store = PageStore::in_memory().unwrap();
        let id = store.create_page(a4_geometry()).unwrap();
        store.update_type(id, 2).unwrap();
        store.lock_page(id).unwrap();

        // 100 local units = 21 mm, anchored at the markers.
        store.insert_audio(id, 100, 200, 100, 52, 7).unwrap();
        let config = store.lookup(id, false, false).unwrap();
        assert_eq!(config.audio_areas.len(), 1);
        let area = &config.audio_areas[0];
        assert_eq!(area.x, 21);
        assert_eq!(area.y, 42);
        assert_eq!(area.width, 21);
        assert_eq!(area.height, 11);
        assert_eq!(area.sound_clip_id, 7);
    }

    #[test]
    fn scaled_lookup_round_trips_box_coordinates() {
        let store = PageStore::in_memory().unwrap();
        let id = checkbox_page(&store);
        store.insert_box(id, 42, 63).unwrap();

        let scaled = store.lookup(id, true, false).unwrap();
        assert_eq!(scaled.boxes[0].x, 200);
        assert_eq!(scaled.boxes[0].y, 300);
    }

    #[test]
    fn box_ownership_is_checked() {
        let store = PageStore::in_memory().unwrap();
        let first = checkbox_page(&store);
        let second = checkbox_page(&store);
        let box_id = store.insert_box(first, 50, 50).unwrap();

        assert!(matches!(
            store.update_box(second, box_id, 10, 10, None),
            Err(ServerError::IncorrectPageId)
        ));
        assert!(matches!(
            store.delete_box(first, 9999),
            Err(ServerError::BoxNotFound)
        ));
    }

    #[test]
    fn deleted_boxes_disappear_from_lookups() {
        let store = PageStore::in_memory().unwrap();
        let id = checkbox_page(&store);
        let box_id = store.insert_box(id, 50, 50).unwrap();
        store.delete_box(id, box_id).unwrap();
        let config = store.lookup(id, false, false).unwrap();
        assert!(config.boxes.is_empty());
    }

    #[test]
    fn duplicate_copies_boxes_and_destination_and_starts_unlocked() {
        let store = PageStore::in_memory().unwrap();
        let id = checkbox_page(&store);
        store.insert_box(id, 50, 50).unwrap();
        store.update_destination(id, "orders@example.com").unwrap();
        store.lock_page(id).unwrap();

        let copy = store.duplicate(id, true).unwrap();
        assert_ne!(copy, id);
        let config = store.lookup(copy, false, false).unwrap();
        assert!(!config.locked);
        assert_eq!(config.page_type, 1);
        assert_eq!(config.boxes.len(), 1);
        assert_eq!(config.destination.as_deref(), Some("orders@example.com"));
    }

    #[test]
    fn duplicate_audio_copy_is_configurable() {
        let store = PageStore::in_memory().unwrap();
        let id = store.create_page(a4_geometry()).unwrap();
        store.update_type(id, 2).unwrap();
        store.insert_audio(id, 0, 0, 100, 100, 3).unwrap();

        let with_audio = store.duplicate(id, true).unwrap();
        assert_eq!(store.lookup(with_audio, false, false).unwrap().audio_areas.len(), 1);

        let without_audio = store.duplicate(id, false).unwrap();
        assert!(store.lookup(without_audio, false, false).unwrap().audio_areas.is_empty());
    }

    #[test]
    fn pages_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pages.db");

        let id = {
            let store = PageStore::open(&path).unwrap();
            let id = store.create_page(a4_geometry()).unwrap();
            store.update_type(id, 1).unwrap();
            store.insert_box(id, 50, 50).unwrap();
            id
        };

        let store = PageStore::open(&path).unwrap();
        let config = store.lookup(id, false, false).unwrap();
        assert_eq!(config.page_type, 1);
        assert_eq!(config.boxes.len(), 1);
    }

    #[test]
    fn destination_requires_checkbox_type() {
        let store = PageStore::in_memory().unwrap();
        let id = store.create_page(a4_geometry()).unwrap();
        assert!(matches!(
            store.update_destination(id, "x@example.com"),
            Err(ServerError::IncorrectPageType)
        ));
    }
}
