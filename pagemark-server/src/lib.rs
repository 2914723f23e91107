//! # Pagemark Server
//!
//! Synchronization backend for marker-encoded pages: a SQLite-backed page
//! store, the base-52 page key codec, the scan lock protocol and a flat
//! JSON/JSONP query API served over HTTP.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod error;
pub mod key;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

pub use error::{ServerError, ServerResult};
pub use key::{decode_page_key, encode_page_key};
pub use store::{PageGeometryRow, PageRow, PageStore};

/// Server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Whether duplicating an audio page copies its recorded regions.
    pub duplicate_audio: bool,
    /// Whether masked failure reasons are reported verbatim.
    pub diagnostics: bool,
}

/// Default port for the pagemark server.
pub const DEFAULT_PORT: u16 = 7243; // "PAGE" on phone keypad

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from("pagemark.db"),
            duplicate_audio: true,
            diagnostics: false,
        }
    }
}

impl ServerConfig {
    /// Read configuration from `PAGEMARK_*` environment variables, falling
    /// back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PAGEMARK_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            db_path: std::env::var("PAGEMARK_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            duplicate_audio: env_flag("PAGEMARK_DUPLICATE_AUDIO", defaults.duplicate_audio),
            diagnostics: env_flag("PAGEMARK_DIAGNOSTICS", defaults.diagnostics),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name).as_deref() {
        Ok("1" | "true" | "yes" | "on") => true,
        Ok("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The page store.
    pub store: Arc<PageStore>,
    /// Runtime configuration.
    pub config: ServerConfig,
}

impl AppState {
    /// State over an in-memory store with default configuration. Used by
    /// tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be created.
    pub fn in_memory() -> ServerResult<Self> {
        Ok(Self {
            store: Arc::new(PageStore::in_memory()?),
            config: ServerConfig::default(),
        })
    }
}
