//! Optimistic server synchronization.
//!
//! Every edit is applied locally first and dispatched as a fire-and-forget
//! request. Each dispatch races a fixed timeout: a response confirms the
//! connection, a timeout marks it lost. The client is sans-io — callers
//! inject the transport and the clock — so the race is unit-testable
//! without timers.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::PageResult;
use crate::session::PageType;
use crate::CONNECTION_TIMEOUT;

/// Identifier for one dispatched request, unique per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One operation on the flat server query surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRequest {
    /// Load a page for editing.
    Edit {
        /// Page key.
        key: String,
    },
    /// Resolve a scanned page, scaling element coordinates to local grid
    /// units. Locks interactive pages as a side effect.
    Lookup {
        /// Page key.
        key: String,
    },
    /// Create a page; the response carries the assigned page key.
    NewPage {
        /// Paper width in mm.
        width: u32,
        /// Paper height in mm.
        height: u32,
        /// Left marker X in mm.
        left_x: i64,
        /// Left marker Y in mm.
        left_y: i64,
        /// Right marker X in mm.
        right_x: i64,
        /// Right marker Y in mm.
        right_y: i64,
    },
    /// Persist new marker positions.
    UpdateGeometry {
        /// Page key.
        key: String,
        /// Left marker X in mm.
        left_x: i64,
        /// Left marker Y in mm.
        left_y: i64,
        /// Right marker X in mm.
        right_x: i64,
        /// Right marker Y in mm.
        right_y: i64,
    },
    /// Set the page type.
    UpdateType {
        /// Page key.
        key: String,
        /// New page type.
        page_type: PageType,
    },
    /// Set the page's scan destination.
    UpdateDestination {
        /// Page key.
        key: String,
        /// Destination address.
        destination: String,
    },
    /// Create a tick box; the response echoes `temp_id` with the permanent
    /// id and the stored coordinates.
    NewBox {
        /// Page key.
        key: String,
        /// Client-assigned transient id.
        temp_id: u64,
        /// Centre X in mm.
        x: i64,
        /// Centre Y in mm.
        y: i64,
    },
    /// Update a tick box's position and content.
    UpdateBox {
        /// Page key.
        key: String,
        /// Confirmed box id.
        id: i64,
        /// Centre X in mm.
        x: i64,
        /// Centre Y in mm.
        y: i64,
        /// Item description.
        description: String,
        /// Order quantity.
        quantity: u32,
    },
    /// Delete a tick box.
    DeleteBox {
        /// Page key.
        key: String,
        /// Confirmed box id.
        id: i64,
    },
    /// Record an audio region drawn on a scanned page, in local grid units.
    NewAudio {
        /// Page key.
        key: String,
        /// Left edge in local units.
        x: i64,
        /// Top edge in local units.
        y: i64,
        /// Width in local units.
        width: i64,
        /// Height in local units.
        height: i64,
        /// Attached sound clip.
        sound_clip_id: i64,
    },
    /// Copy a page, its boxes and its destination under a fresh key.
    Duplicate {
        /// Page key to copy.
        key: String,
    },
}

impl SyncRequest {
    /// Encode as query pairs. The first pair names the operation; its value
    /// is the page key where the operation has one.
    #[must_use]
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Edit { key } => vec![("edit", key.clone())],
            Self::Lookup { key } => vec![("lookup", key.clone())],
            Self::NewPage {
                width,
                height,
                left_x,
                left_y,
                right_x,
                right_y,
            } => vec![
                ("new", String::new()),
                ("width", width.to_string()),
                ("height", height.to_string()),
                ("leftX", left_x.to_string()),
                ("leftY", left_y.to_string()),
                ("rightX", right_x.to_string()),
                ("rightY", right_y.to_string()),
            ],
            Self::UpdateGeometry {
                key,
                left_x,
                left_y,
                right_x,
                right_y,
            } => vec![
                ("update", key.clone()),
                ("leftX", left_x.to_string()),
                ("leftY", left_y.to_string()),
                ("rightX", right_x.to_string()),
                ("rightY", right_y.to_string()),
            ],
            Self::UpdateType { key, page_type } => vec![
                ("updatetype", key.clone()),
                ("type", (*page_type as u8).to_string()),
            ],
            Self::UpdateDestination { key, destination } => vec![
                ("updatedestination", key.clone()),
                ("destination", destination.clone()),
            ],
            Self::NewBox {
                key,
                temp_id,
                x,
                y,
            } => vec![
                ("newbox", key.clone()),
                ("tempId", temp_id.to_string()),
                ("x", x.to_string()),
                ("y", y.to_string()),
            ],
            Self::UpdateBox {
                key,
                id,
                x,
                y,
                description,
                quantity,
            } => vec![
                ("updatebox", key.clone()),
                ("id", id.to_string()),
                ("x", x.to_string()),
                ("y", y.to_string()),
                ("description", description.clone()),
                ("amount", quantity.to_string()),
            ],
            Self::DeleteBox { key, id } => {
                vec![("deletebox", key.clone()), ("id", id.to_string())]
            }
            Self::NewAudio {
                key,
                x,
                y,
                width,
                height,
                sound_clip_id,
            } => vec![
                ("newaudio", key.clone()),
                ("x", x.to_string()),
                ("y", y.to_string()),
                ("width", width.to_string()),
                ("height", height.to_string()),
                ("soundClipId", sound_clip_id.to_string()),
            ],
            Self::Duplicate { key } => vec![("duplicate", key.clone())],
        }
    }
}

/// Parsed server reply: a status, an optional failure reason and whatever
/// operation-specific fields the reply carries.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerResponse {
    /// "ok" or "fail".
    pub status: String,
    /// Failure reason, present when diagnostics are enabled server-side.
    #[serde(default)]
    pub reason: Option<String>,
    /// Operation-specific payload fields.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl ServerResponse {
    /// Whether the operation succeeded logically.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Something the caller must react to.
#[derive(Debug)]
pub enum SyncEvent {
    /// A response arrived for an in-flight request.
    Completed {
        /// The request's connection id.
        id: ConnectionId,
        /// The original request, for correlation.
        request: SyncRequest,
        /// The parsed reply.
        response: ServerResponse,
    },
    /// A logical failure that should reach the user.
    Failed {
        /// The request's connection id.
        id: ConnectionId,
        /// The original request.
        request: SyncRequest,
        /// Failure reason reported by the server.
        reason: String,
    },
    /// No response arrived within the timeout; the connection is considered
    /// lost.
    TimedOut {
        /// The request's connection id.
        id: ConnectionId,
        /// The request that went unanswered.
        request: SyncRequest,
    },
}

/// Delivery seam for dispatched requests.
pub trait Transport {
    /// Send one request; responses come back through
    /// [`SyncClient::confirm`] keyed by `id`.
    fn send(&mut self, id: ConnectionId, request: &SyncRequest);
}

#[derive(Debug)]
struct InFlight {
    request: SyncRequest,
    deadline: Instant,
}

/// Tracks in-flight requests and the connection state derived from them.
#[derive(Debug)]
pub struct SyncClient {
    in_flight: HashMap<ConnectionId, InFlight>,
    next_id: u64,
    timeout: Duration,
    surface_logical_failures: bool,
    online: bool,
}

impl Default for SyncClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncClient {
    /// Create a client with the standard timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(CONNECTION_TIMEOUT)
    }

    /// Create a client with a custom timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            in_flight: HashMap::new(),
            next_id: 1,
            timeout,
            surface_logical_failures: false,
            online: true,
        }
    }

    /// Surface logical failures as [`SyncEvent::Failed`] instead of logging
    /// them. Off by default.
    pub fn set_surface_logical_failures(&mut self, surface: bool) {
        self.surface_logical_failures = surface;
    }

    /// Whether the last observed exchange succeeded.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online
    }

    /// Number of unanswered requests.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Send a request and start its timeout clock.
    pub fn dispatch(
        &mut self,
        request: SyncRequest,
        now: Instant,
        transport: &mut dyn Transport,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        transport.send(id, &request);
        self.in_flight.insert(
            id,
            InFlight {
                request,
                deadline: now + self.timeout,
            },
        );
        id
    }

    /// Feed a response body back in. Idempotent: a reply for an unknown id
    /// (already confirmed, or timed out) is dropped with `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PageError::Serialization`] when the body is not
    /// valid response JSON; the request stays in flight in that case.
    pub fn confirm(&mut self, id: ConnectionId, body: &str) -> PageResult<Option<SyncEvent>> {
        if !self.in_flight.contains_key(&id) {
            tracing::debug!("Dropping reply for unknown connection {id}");
            return Ok(None);
        }
        let response: ServerResponse = serde_json::from_str(body)?;
        let Some(entry) = self.in_flight.remove(&id) else {
            return Ok(None);
        };
        self.online = true;
        if response.is_ok() {
            return Ok(Some(SyncEvent::Completed {
                id,
                request: entry.request,
                response,
            }));
        }
        let reason = response
            .reason
            .clone()
            .unwrap_or_else(|| "query error".to_string());
        if self.surface_logical_failures {
            Ok(Some(SyncEvent::Failed {
                id,
                request: entry.request,
                reason,
            }))
        } else {
            tracing::warn!("Server rejected {:?}: {reason}", entry.request);
            Ok(Some(SyncEvent::Completed {
                id,
                request: entry.request,
                response,
            }))
        }
    }

    /// Expire requests whose deadline has passed. Any expiry marks the
    /// connection lost.
    pub fn poll(&mut self, now: Instant) -> Vec<SyncEvent> {
        let expired: Vec<ConnectionId> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        let mut events = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(entry) = self.in_flight.remove(&id) {
                tracing::warn!("Connection {id} timed out");
                self.online = false;
                events.push(SyncEvent::TimedOut {
                    id,
                    request: entry.request,
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(ConnectionId, SyncRequest)>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, id: ConnectionId, request: &SyncRequest) {
            self.sent.push((id, request.clone()));
        }
    }

    fn edit() -> SyncRequest {
        SyncRequest::Edit {
            key: "aQz".to_string(),
        }
    }

    #[test]
    fn response_before_deadline_keeps_client_online() {
        let mut client = SyncClient::new();
        let mut transport = RecordingTransport::default();
        let start = Instant::now();

        let id = client.dispatch(edit(), start, &mut transport);
        assert_eq!(transport.sent.len(), 1);

        let event = client.confirm(id, r#"{"status":"ok"}"#).unwrap().unwrap();
        assert!(matches!(event, SyncEvent::Completed { .. }));
        assert!(client.is_online());
        assert_eq!(client.in_flight(), 0);

        // Past the deadline there is nothing left to expire.
        assert!(client.poll(start + CONNECTION_TIMEOUT).is_empty());
    }

    #[test]
    fn unanswered_request_times_out_and_marks_offline() {
        let mut client = SyncClient::new();
        let mut transport = RecordingTransport::default();
        let start = Instant::now();

        let id = client.dispatch(edit(), start, &mut transport);
        assert!(client.poll(start + Duration::from_secs(9)).is_empty());

        let events = client.poll(start + CONNECTION_TIMEOUT);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SyncEvent::TimedOut { id: timed, .. } if timed == id));
        assert!(!client.is_online());

        // The late reply is dropped, and does not flip the state back.
        assert!(client.confirm(id, r#"{"status":"ok"}"#).unwrap().is_none());
        assert!(!client.is_online());
    }

    #[test]
    fn logical_failures_are_silent_unless_surfaced() {
        let mut client = SyncClient::new();
        let mut transport = RecordingTransport::default();
        let start = Instant::now();

        let id = client.dispatch(edit(), start, &mut transport);
        let event = client
            .confirm(id, r#"{"status":"fail"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(event, SyncEvent::Completed { .. }));
        assert!(client.is_online());

        client.set_surface_logical_failures(true);
        let id = client.dispatch(edit(), start, &mut transport);
        let event = client
            .confirm(id, r#"{"status":"fail","reason":"page not found"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(event, SyncEvent::Failed { ref reason, .. } if reason == "page not found"));
    }

    #[test]
    fn malformed_reply_leaves_request_in_flight() {
        let mut client = SyncClient::new();
        let mut transport = RecordingTransport::default();
        let start = Instant::now();

        let id = client.dispatch(edit(), start, &mut transport);
        assert!(client.confirm(id, "<html>").is_err());
        assert_eq!(client.in_flight(), 1);
    }

    #[test]
    fn query_encoding_names_operation_first() {
        let query = SyncRequest::NewBox {
            key: "bC".to_string(),
            temp_id: 3,
            x: 120,
            y: 45,
        }
        .to_query();
        assert_eq!(query[0], ("newbox", "bC".to_string()));
        assert!(query.contains(&("tempId", "3".to_string())));
        assert!(query.contains(&("x", "120".to_string())));

        let query = SyncRequest::UpdateBox {
            key: "bC".to_string(),
            id: 12,
            x: 80,
            y: 60,
            description: "paper clips".to_string(),
            quantity: 2,
        }
        .to_query();
        assert_eq!(query[0], ("updatebox", "bC".to_string()));
        assert!(query.contains(&("amount", "2".to_string())));
    }
}
