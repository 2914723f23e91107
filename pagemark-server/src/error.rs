//! Server error types and the reasons clients see.
//!
//! Domain failures (page not found, lock violations) always report their
//! real reason; infrastructure and validation failures are masked behind a
//! generic reason unless diagnostics are enabled, so the public surface
//! leaks nothing about the database or query parsing.

use thiserror::Error;

/// Reason reported for masked failures.
pub const GENERIC_FAILURE: &str = "query error";

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while servicing a page request.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The page does not exist.
    #[error("page not found")]
    PageNotFound,

    /// The operation does not apply to this page's type.
    #[error("incorrect page type")]
    IncorrectPageType,

    /// The page has been scanned and can no longer be edited.
    #[error("the page is locked")]
    PageLocked,

    /// The referenced tick box does not exist.
    #[error("box not found")]
    BoxNotFound,

    /// The referenced tick box belongs to a different page.
    #[error("incorrect page id")]
    IncorrectPageId,

    /// The requested page type code is not recognised.
    #[error("invalid page type")]
    InvalidPageType,

    /// The page key does not decode to a row id.
    #[error("invalid page key")]
    InvalidPageKey,

    /// A request parameter is missing or malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl ServerError {
    /// The reason string exposed to clients. Domain failures are always
    /// verbatim; the rest collapse to [`GENERIC_FAILURE`] unless
    /// `diagnostics` is on.
    #[must_use]
    pub fn public_reason(&self, diagnostics: bool) -> String {
        match self {
            Self::PageNotFound
            | Self::IncorrectPageType
            | Self::PageLocked
            | Self::BoxNotFound
            | Self::IncorrectPageId
            | Self::InvalidPageType => self.to_string(),
            Self::InvalidPageKey | Self::InvalidRequest(_) | Self::Database(_) => {
                if diagnostics {
                    self.to_string()
                } else {
                    GENERIC_FAILURE.to_string()
                }
            }
        }
    }
}
