//! Long-poll transport: one parked request, answered at most once.

use std::sync::Arc;

use courier_core::ConnectionId;
use courier_delivery::{DeliveryMode, Transport};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A parked long-poll request.
pub struct PollTransport {
    id: ConnectionId,
    tx: Mutex<Option<oneshot::Sender<Vec<Arc<str>>>>>,
}

impl PollTransport {
    /// Create a transport and the receiver the request handler awaits.
    pub fn new(id: ConnectionId) -> (Arc<Self>, oneshot::Receiver<Vec<Arc<str>>>) {
        let (tx, rx) = oneshot::channel();
        let transport = Arc::new(Self {
            id,
            tx: Mutex::new(Some(tx)),
        });
        (transport, rx)
    }
}

impl Transport for PollTransport {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::LongPoll
    }

    fn push(&self, frames: &[Arc<str>]) -> bool {
        self.tx
            .lock()
            .take()
            .is_some_and(|tx| tx.send(frames.to_vec()).is_ok())
    }

    fn ping(&self) -> bool {
        !self.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().is_none_or(oneshot::Sender::is_closed)
    }
}

/// Render envelopes as a JSON array body without re-parsing them.
pub fn batch_body(frames: &[Arc<str>]) -> String {
    let mut body = String::with_capacity(2 + frames.iter().map(|f| f.len() + 1).sum::<usize>());
    body.push('[');
    for (i, frame) in frames.iter().enumerate() {
        if i > 0 {
            body.push(',');
        }
        body.push_str(frame);
    }
    body.push(']');
    body
}
