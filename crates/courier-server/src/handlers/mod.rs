//! HTTP and WebSocket route handlers.

pub mod longpoll;
pub mod ws;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use courier_core::SessionId;
use courier_delivery::Stamp;
use metrics::counter;
use serde::Deserialize;
use tracing::debug;

use crate::metrics::AUTH_FAILURES_TOTAL;

/// Response header carrying the session id on long-poll replies.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Query parameters shared by the WebSocket handshake and long-poll requests.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    /// Session to resume.
    pub session_id: Option<String>,
    /// Timestamp of the last message the client consumed.
    pub last_timestamp: Option<i64>,
    /// Sequence of the last message the client consumed.
    pub last_sequence: Option<u64>,
    /// Credential for clients that cannot send headers.
    pub token: Option<String>,
}

impl ConnectQuery {
    /// Declared high-water mark; missing parts count as zero.
    pub fn last(&self) -> Stamp {
        Stamp::new(
            self.last_timestamp.unwrap_or(0),
            self.last_sequence.unwrap_or(0),
        )
    }

    /// Declared session, if non-blank.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SessionId::from)
    }
}

pub(crate) fn unauthorized(route: &'static str) -> Response {
    counter!(AUTH_FAILURES_TOTAL).increment(1);
    debug!(route, "rejecting unauthenticated request");
    (StatusCode::UNAUTHORIZED, "authentication required").into_response()
}
