//! WebSocket-backed transport.
//!
//! Each push is queued as a single channel item, so a replay of any length
//! either fits whole or not at all. A push that does not fit closes the
//! socket: the client reconnects and replays from its last ack instead of
//! continuing past a hole.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use courier_core::{ConnectionId, SessionId};
use courier_delivery::{DeliveryMode, Transport};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Work item for a socket's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// One text frame.
    Text(Arc<str>),
    /// Several text frames, written back to back.
    Batch(Vec<Arc<str>>),
    /// A protocol-level ping.
    Ping,
    /// Close the socket; the session moved to another connection.
    Close,
}

/// Handshake frame sent on attach, ahead of any replay.
pub fn session_frame(session_id: &SessionId, mode: DeliveryMode) -> Arc<str> {
    Arc::from(
        json!({
            "session": {
                "sessionId": session_id,
                "mode": mode.as_str(),
            }
        })
        .to_string(),
    )
}

/// A connected WebSocket as seen by the delivery core.
pub struct WsTransport {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    close: CancellationToken,
    closed: AtomicBool,
    dropped_frames: AtomicU64,
}

impl WsTransport {
    /// Create a transport and the receiver its writer task drains.
    ///
    /// `close` is cancelled when the transport gives up on the socket; the
    /// writer task watches it.
    pub fn new(
        id: ConnectionId,
        buffer: usize,
        close: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let transport = Arc::new(Self {
            id,
            tx,
            close,
            closed: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
        });
        (transport, rx)
    }

    /// Flag the socket as gone without asking the writer to close it.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    /// Flag the socket as gone and tell the writer to close it.
    pub fn close(&self) {
        self.mark_closed();
        self.close.cancel();
    }

    /// Token the writer task watches for [`close`](Self::close).
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Frames lost because the writer fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    fn send(&self, item: Outbound, frames: usize) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(frames as u64, Ordering::Relaxed);
                warn!(connection_id = %self.id, frames, "outbound queue full, closing socket");
                self.close();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }
}

impl Transport for WsTransport {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::WebSocket
    }

    fn push(&self, frames: &[Arc<str>]) -> bool {
        match frames {
            [] => !self.is_closed(),
            [frame] => self.send(Outbound::Text(frame.clone()), 1),
            _ => self.send(Outbound::Batch(frames.to_vec()), frames.len()),
        }
    }

    fn ping(&self) -> bool {
        self.send(Outbound::Ping, 0)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.close.is_cancelled() || self.tx.is_closed()
    }

    fn on_attach(&self, session_id: &SessionId) {
        let _ = self.send(
            Outbound::Text(session_frame(session_id, DeliveryMode::WebSocket)),
            1,
        );
    }

    fn on_detach(&self) {
        if !self.is_closed() {
            debug!(connection_id = %self.id, "closing superseded socket");
            if self.tx.try_send(Outbound::Close).is_err() {
                self.close();
            }
        }
    }
}
