//! In-memory [`Transport`] that records everything pushed through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use courier_core::{ConnectionId, SessionId};
use parking_lot::Mutex;
use serde_json::Value;

use crate::transport::{DeliveryMode, Transport};

pub(crate) struct RecordingTransport {
    id: ConnectionId,
    mode: DeliveryMode,
    pushes: Mutex<Vec<Vec<Arc<str>>>>,
    attached: Mutex<Vec<SessionId>>,
    pings: AtomicUsize,
    detaches: AtomicUsize,
    closed: AtomicBool,
    accepting: AtomicBool,
    panic_on_ping: AtomicBool,
}

impl RecordingTransport {
    fn new(mode: DeliveryMode) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            mode,
            pushes: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            pings: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            panic_on_ping: AtomicBool::new(false),
        })
    }

    pub(crate) fn websocket() -> Arc<Self> {
        Self::new(DeliveryMode::WebSocket)
    }

    pub(crate) fn long_poll() -> Arc<Self> {
        Self::new(DeliveryMode::LongPoll)
    }

    /// Every push call, including empty ones.
    pub(crate) fn pushes(&self) -> Vec<Vec<Arc<str>>> {
        self.pushes.lock().clone()
    }

    /// All frames pushed, flattened and parsed.
    pub(crate) fn frames(&self) -> Vec<Value> {
        self.pushes
            .lock()
            .iter()
            .flatten()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect()
    }

    /// `data` of every pushed frame.
    pub(crate) fn payloads(&self) -> Vec<Value> {
        self.frames().into_iter().map(|f| f["data"].clone()).collect()
    }

    pub(crate) fn attached_sessions(&self) -> Vec<SessionId> {
        self.attached.lock().clone()
    }

    pub(crate) fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub(crate) fn panic_on_ping(&self) {
        self.panic_on_ping.store(true, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    fn mode(&self) -> DeliveryMode {
        self.mode
    }

    fn push(&self, frames: &[Arc<str>]) -> bool {
        if self.closed.load(Ordering::SeqCst) || !self.accepting.load(Ordering::SeqCst) {
            return false;
        }
        self.pushes.lock().push(frames.to_vec());
        true
    }

    fn ping(&self) -> bool {
        assert!(
            !self.panic_on_ping.load(Ordering::SeqCst),
            "transport exploded on ping"
        );
        let _ = self.pings.fetch_add(1, Ordering::SeqCst);
        !self.closed.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_attach(&self, session_id: &SessionId) {
        self.attached.lock().push(session_id.clone());
    }

    fn on_detach(&self) {
        let _ = self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}
