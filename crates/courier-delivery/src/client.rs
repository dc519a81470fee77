//! Per-session delivery state.
//!
//! A [`Client`] owns one session's backlog and at most one live
//! [`Transport`]. All mutation goes through a single lock, so attach,
//! enqueue, ack and the timeout sweep never interleave for one client.
//!
//! ```text
//!             set_context_and_replay (ws)
//!   Detached ─────────────────────────────▶ AttachedWebSocket
//!      ▲  ▲                                        │
//!      │  │  transport closed / detach             │
//!      │  └────────────────────────────────────────┘
//!      │
//!      │  one flush (replay, arrival or timeout)
//!      └──────────────────────────────────────── AttachedPoll
//!
//!   any state ── idle past grace / expire() ──▶ Expired
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use courier_core::time::format_ms;
use courier_core::{ConnectionId, Principal, SessionId};
use metrics::counter;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::clock::Stamp;
use crate::message::Message;
use crate::metrics::MESSAGES_REPLAYED_TOTAL;
use crate::retention::Retention;
use crate::transport::{DeliveryMode, Transport};

/// Observable lifecycle state of a [`Client`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No live transport; messages accumulate in the backlog.
    Detached,
    /// Attached to a persistent socket.
    AttachedWebSocket,
    /// One long-poll request is parked waiting for a message.
    AttachedPoll,
    /// Terminal. The client is (or is about to be) out of the registry.
    Expired,
}

/// Timing knobs a client needs for its own sweep step, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ClientTimeouts {
    pub(crate) ctx_ms: i64,
    pub(crate) idle_grace_ms: i64,
    /// Effective soft retention window. A client idle this long is owed
    /// nothing it could still replay, whatever its backlog holds.
    pub(crate) retention_ms: i64,
}

/// What one [`Client::process_timeout`] pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeoutOutcome {
    /// A keepalive ping was sent.
    pub pinged: bool,
    /// A parked poll was answered with an empty batch.
    pub poll_released: bool,
    /// The attachment was dropped (closed transport or failed ping).
    pub detached: bool,
    /// Backlog entries removed by retention.
    pub evicted: usize,
    /// The client is now expired.
    pub expired: bool,
}

struct Attachment {
    transport: Arc<dyn Transport>,
    attached_at_ms: i64,
    last_outbound_ms: i64,
}

impl Attachment {
    fn mode(&self) -> DeliveryMode {
        self.transport.mode()
    }
}

struct Inner {
    backlog: VecDeque<Arc<Message>>,
    attachment: Option<Attachment>,
    last_received: Stamp,
    last_activity_ms: i64,
    expired: bool,
}

impl Inner {
    /// Drop the current attachment. A parked poll is answered empty first.
    fn release(&mut self) -> Option<Arc<dyn Transport>> {
        let attachment = self.attachment.take()?;
        if attachment.mode() == DeliveryMode::LongPoll {
            let _ = attachment.transport.push(&[]);
        }
        attachment.transport.on_detach();
        Some(attachment.transport)
    }

    /// Push `frames` over the current attachment, honouring single-shot polls.
    fn deliver(&mut self, frames: &[Arc<str>], now_ms: i64) {
        let Some(attachment) = self.attachment.as_mut() else {
            return;
        };
        let pushed = attachment.transport.push(frames);
        match attachment.mode() {
            DeliveryMode::LongPoll => {
                if let Some(attachment) = self.attachment.take() {
                    attachment.transport.on_detach();
                }
            }
            DeliveryMode::WebSocket => {
                if pushed {
                    attachment.last_outbound_ms = now_ms;
                } else if attachment.transport.is_closed() {
                    if let Some(attachment) = self.attachment.take() {
                        attachment.transport.on_detach();
                    }
                }
            }
        }
    }
}

/// One session's backlog and attachment.
pub struct Client {
    principal: Principal,
    session_id: SessionId,
    created_at_ms: i64,
    timeouts: ClientTimeouts,
    inner: Mutex<Inner>,
}

impl Client {
    pub(crate) fn new(
        principal: Principal,
        session_id: SessionId,
        timeouts: ClientTimeouts,
        now_ms: i64,
    ) -> Self {
        Self {
            principal,
            session_id,
            created_at_ms: now_ms,
            timeouts,
            inner: Mutex::new(Inner {
                backlog: VecDeque::new(),
                attachment: None,
                last_received: Stamp::ZERO,
                last_activity_ms: now_ms,
                expired: false,
            }),
        }
    }

    /// Owning principal.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Session identity.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Creation time in epoch milliseconds.
    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        let inner = self.inner.lock();
        if inner.expired {
            return ClientState::Expired;
        }
        match inner.attachment.as_ref().map(Attachment::mode) {
            None => ClientState::Detached,
            Some(DeliveryMode::WebSocket) => ClientState::AttachedWebSocket,
            Some(DeliveryMode::LongPoll) => ClientState::AttachedPoll,
        }
    }

    /// Connection currently attached, if any.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.inner
            .lock()
            .attachment
            .as_ref()
            .map(|a| a.transport.connection_id().clone())
    }

    /// Acknowledged high-water mark.
    pub fn last_received_stamp(&self) -> Stamp {
        self.inner.lock().last_received
    }

    /// Last attach, detach or ack, in epoch milliseconds.
    pub fn last_activity_ms(&self) -> i64 {
        self.inner.lock().last_activity_ms
    }

    /// Stamps currently held in the backlog, ascending.
    pub fn backlog_stamps(&self) -> Vec<Stamp> {
        self.inner.lock().backlog.iter().map(|m| m.stamp()).collect()
    }

    /// Number of backlog entries.
    pub fn backlog_len(&self) -> usize {
        self.inner.lock().backlog.len()
    }

    /// Attach `transport` and replay everything newer than `last`.
    ///
    /// Any previous attachment is released first. A WebSocket stays
    /// attached afterwards; a long poll is answered right away if there is
    /// anything to replay and parked otherwise.
    ///
    /// Returns the number of replayed messages, or `None` if the client has
    /// already expired and must be replaced.
    pub fn set_context_and_replay(
        &self,
        transport: Arc<dyn Transport>,
        last: Stamp,
        now_ms: i64,
    ) -> Option<usize> {
        let mut inner = self.inner.lock();
        if inner.expired {
            return None;
        }

        let same_connection = inner
            .attachment
            .as_ref()
            .is_some_and(|a| a.transport.connection_id() == transport.connection_id());
        if same_connection {
            inner.attachment = None;
        } else if let Some(previous) = inner.release() {
            debug!(
                session_id = %self.session_id,
                previous = %previous.connection_id(),
                "released previous attachment"
            );
        }

        let frames: Vec<Arc<str>> = inner
            .backlog
            .iter()
            .filter(|m| m.stamp() > last)
            .map(|m| m.frame().clone())
            .collect();
        let replayed = frames.len();
        let mode = transport.mode();

        inner.last_activity_ms = now_ms;
        if !same_connection {
            transport.on_attach(&self.session_id);
        }
        inner.attachment = Some(Attachment {
            transport,
            attached_at_ms: now_ms,
            last_outbound_ms: now_ms,
        });

        // An empty poll stays parked until an arrival or the sweep.
        if replayed > 0 {
            inner.deliver(&frames, now_ms);
            counter!(MESSAGES_REPLAYED_TOTAL).increment(replayed as u64);
        }
        debug!(
            session_id = %self.session_id,
            %mode,
            %last,
            replayed,
            "client attached"
        );
        Some(replayed)
    }

    /// Insert `message` into the backlog and push it if attached.
    ///
    /// Returns `false` if the client is expired or already holds a message
    /// with the same stamp. Callers hold the stamp's clock guard, so
    /// messages arrive here in stamp order.
    pub(crate) fn enqueue(&self, message: Arc<Message>, now_ms: i64) -> bool {
        let mut inner = self.inner.lock();
        if inner.expired {
            return false;
        }

        let stamp = message.stamp();
        let at = match inner.backlog.binary_search_by(|m| m.stamp().cmp(&stamp)) {
            Ok(_) => return false,
            Err(at) => at,
        };
        let frame = message.frame().clone();
        inner.backlog.insert(at, message);

        inner.deliver(&[frame], now_ms);
        true
    }

    /// Record an acknowledgment. Older or repeated acks are ignored.
    ///
    /// Returns the high-water mark after the update.
    pub fn last_received(&self, stamp: Stamp, now_ms: i64) -> Stamp {
        let mut inner = self.inner.lock();
        inner.last_activity_ms = now_ms;
        if stamp > inner.last_received {
            inner.last_received = stamp;
        }
        inner.last_received
    }

    /// Drop the attachment if it belongs to `connection_id`.
    ///
    /// A stale connection closing after the session moved elsewhere is
    /// ignored. Returns whether anything was detached.
    pub fn detach(&self, connection_id: &ConnectionId, now_ms: i64) -> bool {
        let mut inner = self.inner.lock();
        let matches = inner
            .attachment
            .as_ref()
            .is_some_and(|a| a.transport.connection_id() == connection_id);
        if !matches {
            return false;
        }
        if let Some(attachment) = inner.attachment.take() {
            attachment.transport.on_detach();
        }
        inner.last_activity_ms = now_ms;
        debug!(session_id = %self.session_id, %connection_id, "client detached");
        true
    }

    /// One sweep step: keepalive, poll release, retention and expiry.
    pub fn process_timeout(&self, now_ms: i64) -> TimeoutOutcome {
        let mut outcome = TimeoutOutcome::default();
        let mut inner = self.inner.lock();
        if inner.expired {
            outcome.expired = true;
            return outcome;
        }

        let ctx_ms = self.timeouts.ctx_ms;
        if let Some(attachment) = inner.attachment.as_mut() {
            if attachment.transport.is_closed() {
                outcome.detached = true;
            } else {
                match attachment.mode() {
                    DeliveryMode::WebSocket => {
                        if now_ms.saturating_sub(attachment.last_outbound_ms) >= ctx_ms {
                            if attachment.transport.ping() {
                                attachment.last_outbound_ms = now_ms;
                                outcome.pinged = true;
                            } else {
                                outcome.detached = true;
                            }
                        }
                    }
                    DeliveryMode::LongPoll => {
                        if now_ms.saturating_sub(attachment.attached_at_ms) >= ctx_ms {
                            let _ = attachment.transport.push(&[]);
                            outcome.poll_released = true;
                        }
                    }
                }
            }
        }
        if outcome.detached || outcome.poll_released {
            if let Some(attachment) = inner.attachment.take() {
                attachment.transport.on_detach();
            }
            inner.last_activity_ms = now_ms;
        }

        let last = inner.last_received;
        let before = inner.backlog.len();
        inner
            .backlog
            .retain(|m| Retention::classify(m, now_ms, last) == Retention::Keep);
        outcome.evicted = before - inner.backlog.len();

        let idle_ms = now_ms.saturating_sub(inner.last_activity_ms);
        let abandoned = idle_ms >= self.timeouts.retention_ms;
        if inner.attachment.is_none()
            && (inner.backlog.is_empty() || abandoned)
            && idle_ms >= self.timeouts.idle_grace_ms
        {
            inner.expired = true;
            outcome.expired = true;
            let unacked = inner.backlog.len();
            inner.backlog.clear();
            info!(
                session_id = %self.session_id,
                idle_ms,
                last_activity = %format_ms(inner.last_activity_ms),
                unacked,
                "client expired"
            );
        }

        outcome
    }

    /// Move to `Expired`, releasing any attachment.
    ///
    /// Returns `false` if the client was already expired.
    pub fn expire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.expired {
            return false;
        }
        inner.expired = true;
        let _ = inner.release();
        inner.backlog.clear();
        true
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("session_id", &self.session_id)
            .field("user_id", &self.principal.user_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::RetentionPolicy;
    use crate::testing::RecordingTransport;
    use serde_json::json;
    use std::time::Duration;

    const CTX: i64 = 20_000;
    const GRACE: i64 = 60_000;
    const SOFT: i64 = 30_000;

    fn client_with_grace(idle_grace_ms: i64) -> Client {
        Client::new(
            Principal::new("u1", "alice"),
            SessionId::from("s1"),
            ClientTimeouts {
                ctx_ms: CTX,
                idle_grace_ms,
                retention_ms: SOFT,
            },
            0,
        )
    }

    fn client() -> Client {
        client_with_grace(GRACE)
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(Duration::from_secs(5), Duration::from_secs(30))
    }

    fn msg(ts: i64, seq: u64) -> Arc<Message> {
        Arc::new(Message::new(Stamp::new(ts, seq), json!({"n": ts * 10 + seq as i64}), &policy()).unwrap())
    }

    fn fill(c: &Client, stamps: &[(i64, u64)]) -> Vec<Stamp> {
        stamps
            .iter()
            .map(|&(ts, seq)| {
                let m = msg(ts, seq);
                assert!(c.enqueue(m.clone(), ts));
                m.stamp()
            })
            .collect()
    }

    // ── backlog ordering ──

    #[test]
    fn backlog_stays_sorted_when_arrivals_interleave() {
        let c = client();
        let _ = fill(&c, &[(3, 0), (1, 0), (2, 1), (2, 0)]);
        assert_eq!(
            c.backlog_stamps(),
            vec![
                Stamp::new(1, 0),
                Stamp::new(2, 0),
                Stamp::new(2, 1),
                Stamp::new(3, 0)
            ]
        );
    }

    #[test]
    fn duplicate_stamp_is_ignored() {
        let c = client();
        assert!(c.enqueue(msg(5, 0), 5));
        assert!(!c.enqueue(msg(5, 0), 5));
        assert_eq!(c.backlog_len(), 1);
    }

    // ── replay ──

    #[test]
    fn replay_sends_only_newer_messages_in_order() {
        let c = client();
        let stamps = fill(&c, &[(1, 0), (1, 1), (2, 0), (3, 0), (3, 1)]);
        let ws = RecordingTransport::websocket();

        let replayed = c.set_context_and_replay(ws.clone(), stamps[1], 10);

        assert_eq!(replayed, Some(3));
        let got: Vec<Stamp> = ws
            .frames()
            .iter()
            .map(|f| serde_json::from_value(f["metadata"].clone()).unwrap())
            .collect();
        assert_eq!(got, stamps[2..].to_vec());
        assert_eq!(c.state(), ClientState::AttachedWebSocket);
    }

    #[test]
    fn replay_does_not_consume_backlog() {
        let c = client();
        let stamps = fill(&c, &[(1, 0), (2, 0), (3, 0)]);

        let first = RecordingTransport::websocket();
        let second = RecordingTransport::websocket();
        assert_eq!(c.set_context_and_replay(first.clone(), stamps[0], 10), Some(2));
        assert_eq!(c.set_context_and_replay(second.clone(), stamps[0], 11), Some(2));

        assert_eq!(first.payloads(), second.payloads());
        assert_eq!(c.backlog_len(), 3);
    }

    #[test]
    fn attach_calls_hook_before_replay() {
        let c = client();
        let _ = fill(&c, &[(1, 0)]);
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 10);
        assert_eq!(ws.attached_sessions(), vec![SessionId::from("s1")]);
        assert_eq!(ws.pushes().len(), 1);
    }

    #[test]
    fn reattach_detaches_previous_socket() {
        let c = client();
        let old = RecordingTransport::websocket();
        let new = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(old.clone(), Stamp::ZERO, 0);
        let _ = c.set_context_and_replay(new.clone(), Stamp::ZERO, 1);

        assert_eq!(old.detach_count(), 1);
        assert_eq!(new.detach_count(), 0);
        assert_eq!(c.connection_id().as_ref(), Some(new.connection_id()));
    }

    #[test]
    fn reattach_same_connection_keeps_it() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 1);

        assert_eq!(ws.detach_count(), 0);
        assert_eq!(ws.attached_sessions().len(), 1);
        assert_eq!(c.state(), ClientState::AttachedWebSocket);
    }

    #[test]
    fn reattach_releases_parked_poll_empty() {
        let c = client();
        let poll = RecordingTransport::long_poll();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(poll.clone(), Stamp::ZERO, 0);
        assert_eq!(c.state(), ClientState::AttachedPoll);

        let _ = c.set_context_and_replay(ws, Stamp::ZERO, 1);
        assert_eq!(poll.pushes(), vec![Vec::<Arc<str>>::new()]);
        assert_eq!(poll.detach_count(), 1);
    }

    #[test]
    fn expired_client_refuses_attach() {
        let c = client();
        assert!(c.expire());
        assert!(!c.expire());
        assert_eq!(
            c.set_context_and_replay(RecordingTransport::websocket(), Stamp::ZERO, 0),
            None
        );
        assert_eq!(c.state(), ClientState::Expired);
    }

    // ── live delivery ──

    #[test]
    fn live_push_when_socket_attached() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        assert!(c.enqueue(msg(1, 0), 1));
        assert!(c.enqueue(msg(1, 1), 1));
        assert_eq!(ws.payloads(), vec![json!({"n": 10}), json!({"n": 11})]);
        assert_eq!(c.state(), ClientState::AttachedWebSocket);
    }

    #[test]
    fn failed_push_on_closed_socket_detaches() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        ws.close();
        assert!(c.enqueue(msg(1, 0), 1));
        assert_eq!(c.state(), ClientState::Detached);
        assert_eq!(c.backlog_len(), 1);
    }

    #[test]
    fn failed_push_on_busy_socket_keeps_attachment() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        ws.set_accepting(false);
        assert!(c.enqueue(msg(1, 0), 1));
        assert_eq!(c.state(), ClientState::AttachedWebSocket);
        assert_eq!(c.backlog_len(), 1);
    }

    // ── long poll ──

    #[test]
    fn poll_with_backlog_flushes_and_detaches() {
        let c = client();
        let stamps = fill(&c, &[(1, 0), (2, 0)]);
        let poll = RecordingTransport::long_poll();

        assert_eq!(c.set_context_and_replay(poll.clone(), stamps[0], 5), Some(1));
        assert_eq!(poll.pushes().len(), 1);
        assert_eq!(poll.payloads(), vec![json!({"n": 20})]);
        assert_eq!(poll.detach_count(), 1);
        assert_eq!(c.state(), ClientState::Detached);
    }

    #[test]
    fn parked_poll_flushes_on_first_arrival() {
        let c = client();
        let poll = RecordingTransport::long_poll();
        assert_eq!(c.set_context_and_replay(poll.clone(), Stamp::ZERO, 0), Some(0));
        assert_eq!(c.state(), ClientState::AttachedPoll);
        assert!(poll.pushes().is_empty());

        assert!(c.enqueue(msg(3, 0), 3));
        assert!(c.enqueue(msg(3, 1), 3));

        assert_eq!(poll.pushes().len(), 1);
        assert_eq!(poll.payloads(), vec![json!({"n": 30})]);
        assert_eq!(c.state(), ClientState::Detached);
        assert_eq!(c.backlog_len(), 2);
    }

    #[test]
    fn parked_poll_released_empty_after_ctx_timeout() {
        let c = client();
        let poll = RecordingTransport::long_poll();
        let _ = c.set_context_and_replay(poll.clone(), Stamp::ZERO, 1_000);

        let early = c.process_timeout(1_000 + CTX - 1);
        assert!(!early.poll_released);
        assert_eq!(c.state(), ClientState::AttachedPoll);

        let due = c.process_timeout(1_000 + CTX);
        assert!(due.poll_released);
        assert_eq!(poll.pushes(), vec![Vec::<Arc<str>>::new()]);
        assert_eq!(poll.detach_count(), 1);
        assert_eq!(c.state(), ClientState::Detached);
    }

    // ── acks ──

    #[test]
    fn ack_is_a_high_water_mark() {
        let c = client();
        assert_eq!(c.last_received(Stamp::new(5, 1), 1), Stamp::new(5, 1));
        assert_eq!(c.last_received(Stamp::new(4, 9), 2), Stamp::new(5, 1));
        assert_eq!(c.last_received(Stamp::new(5, 1), 3), Stamp::new(5, 1));
        assert_eq!(c.last_received_stamp(), Stamp::new(5, 1));
        assert_eq!(c.last_activity_ms(), 3);
    }

    #[test]
    fn delivery_does_not_ack() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws, Stamp::ZERO, 0);
        let _ = c.enqueue(msg(1, 0), 1);
        assert_eq!(c.last_received_stamp(), Stamp::ZERO);
    }

    // ── detach ──

    #[test]
    fn detach_ignores_foreign_connection() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);

        assert!(!c.detach(&ConnectionId::from("someone-else"), 1));
        assert_eq!(c.state(), ClientState::AttachedWebSocket);

        assert!(c.detach(ws.connection_id(), 2));
        assert_eq!(c.state(), ClientState::Detached);
        assert_eq!(ws.detach_count(), 1);
    }

    // ── keepalive ──

    #[test]
    fn idle_socket_is_pinged_once_per_ctx() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);

        assert!(!c.process_timeout(CTX - 1).pinged);
        assert!(c.process_timeout(CTX).pinged);
        assert!(!c.process_timeout(CTX + 1).pinged);
        assert!(c.process_timeout(2 * CTX).pinged);
        assert_eq!(ws.ping_count(), 2);
    }

    #[test]
    fn outbound_traffic_defers_ping() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        let _ = c.enqueue(msg(CTX - 10, 0), CTX - 10);
        assert!(!c.process_timeout(CTX).pinged);
        assert_eq!(ws.ping_count(), 0);
    }

    #[test]
    fn closed_socket_is_detached_by_sweep() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        ws.close();
        let outcome = c.process_timeout(1);
        assert!(outcome.detached);
        assert_eq!(c.state(), ClientState::Detached);
    }

    // ── retention and expiry ──

    #[test]
    fn sweep_applies_two_tier_retention() {
        let c = client();
        let stamps = fill(&c, &[(0, 0), (1_000, 0)]);
        let _ = c.last_received(stamps[0], 0);

        // Inside the strong window nothing goes.
        assert_eq!(c.process_timeout(4_999).evicted, 0);
        // Soft window: the acked message goes, the unacked one stays.
        assert_eq!(c.process_timeout(6_000).evicted, 1);
        assert_eq!(c.backlog_stamps(), vec![stamps[1]]);
        // Past soft expiry everything goes.
        assert_eq!(c.process_timeout(31_001).evicted, 1);
        assert_eq!(c.backlog_len(), 0);
    }

    #[test]
    fn detached_idle_client_expires_after_grace() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws.clone(), Stamp::ZERO, 0);
        assert!(c.detach(ws.connection_id(), 100));

        assert!(!c.process_timeout(100 + GRACE - 1).expired);
        let outcome = c.process_timeout(100 + GRACE);
        assert!(outcome.expired);
        assert_eq!(c.state(), ClientState::Expired);
    }

    #[test]
    fn attached_client_never_idles_out() {
        let c = client();
        let ws = RecordingTransport::websocket();
        let _ = c.set_context_and_replay(ws, Stamp::ZERO, 0);
        assert!(!c.process_timeout(10 * GRACE).expired);
    }

    #[test]
    fn pending_backlog_delays_expiry() {
        let c = client();
        let _ = fill(&c, &[(0, 0)]);
        assert!(!c.process_timeout(GRACE - 1).expired);
        assert_eq!(c.backlog_len(), 0);
        assert!(c.process_timeout(GRACE).expired);
    }

    #[test]
    fn unacked_backlog_holds_client_only_within_soft_window() {
        let c = client_with_grace(10_000);
        let _ = fill(&c, &[(0, 0)]);

        // Idle past grace but still owed a message it could replay.
        let outcome = c.process_timeout(15_000);
        assert!(!outcome.expired);
        assert_eq!(c.backlog_len(), 1);

        let _ = fill(&c, &[(25_000, 0)]);
        let outcome = c.process_timeout(SOFT);
        assert!(outcome.expired);
        assert_eq!(c.state(), ClientState::Expired);
        assert_eq!(c.backlog_len(), 0);
    }

    #[test]
    fn expire_releases_parked_poll() {
        let c = client();
        let poll = RecordingTransport::long_poll();
        let _ = c.set_context_and_replay(poll.clone(), Stamp::ZERO, 0);
        assert!(c.expire());
        assert_eq!(poll.pushes().len(), 1);
        assert!(poll.pushes()[0].is_empty());
        assert!(!c.enqueue(msg(1, 0), 1));
    }
}
