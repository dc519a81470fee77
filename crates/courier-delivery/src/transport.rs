//! The seam between the delivery core and whatever carries bytes.
//!
//! The core never touches sockets. An adapter wraps each live connection in
//! a [`Transport`] and hands it to [`ClientCache::add_or_update_client`]
//! together with a [`ConnectionContext`] describing who is on the other end.
//!
//! [`ClientCache::add_or_update_client`]: crate::cache::ClientCache::add_or_update_client

use std::fmt;
use std::sync::Arc;

use courier_core::{ConnectionId, Principal, SessionId};
use serde::{Deserialize, Serialize};

/// How a transport delivers frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryMode {
    /// Persistent full-duplex socket.
    WebSocket,
    /// One parked HTTP request, answered once.
    LongPoll,
}

impl DeliveryMode {
    /// Stable lowercase name for logs and handshake frames.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::LongPoll => "longpoll",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound channel to one connected peer.
///
/// Every method is called while the owning client's lock is held, so
/// implementations must return promptly and must not call back into the
/// delivery core.
pub trait Transport: Send + Sync + 'static {
    /// Identity of the underlying connection or request.
    fn connection_id(&self) -> &ConnectionId;

    /// Delivery mode.
    fn mode(&self) -> DeliveryMode;

    /// Queue `frames` for delivery without waiting for the write.
    ///
    /// Returns `false` if nothing could be queued. A long-poll transport
    /// answers its request with the whole slice, which may be empty.
    fn push(&self, frames: &[Arc<str>]) -> bool;

    /// Send a keepalive ping. Returns `false` if the ping could not be queued.
    fn ping(&self) -> bool;

    /// Whether the peer has gone away.
    fn is_closed(&self) -> bool;

    /// Called when this transport becomes a client's attachment.
    fn on_attach(&self, _session_id: &SessionId) {}

    /// Called when this transport stops being a client's attachment.
    fn on_detach(&self) {}
}

/// Per-connection facts established by the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionContext {
    /// The connection this context describes.
    pub connection_id: ConnectionId,
    /// Authenticated user, if any.
    pub principal: Option<Principal>,
    /// Session the client declared or was assigned.
    pub session_id: Option<SessionId>,
}

impl ConnectionContext {
    /// Context for a fresh connection.
    pub fn new(connection_id: ConnectionId, principal: Option<Principal>) -> Self {
        Self {
            connection_id,
            principal,
            session_id: None,
        }
    }

    /// Builder: declared session id. Blank ids are treated as absent.
    #[must_use]
    pub fn with_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id.filter(|s| !s.is_blank());
        self
    }
}
