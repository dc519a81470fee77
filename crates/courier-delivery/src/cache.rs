//! Process-wide client registry and send surface.
//!
//! [`ClientCache`] owns every live [`Client`], the [`SequenceClock`] that
//! orders their messages, and the periodic sweep that keeps them bounded.
//! It is built once at startup and shared by `Arc`.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use courier_core::time::duration_ms;
use courier_core::{ConnectionId, Principal, SessionId, SystemTimeSource, TimeSource};
use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientTimeouts};
use crate::clock::{SequenceClock, Stamp};
use crate::errors::DeliveryError;
use crate::message::Message;
use crate::metrics::{
    CLIENTS_ACTIVE, CLIENTS_EXPIRED_TOTAL, KEEPALIVE_PINGS_TOTAL, MESSAGES_DROPPED_TOTAL,
    MESSAGES_ENQUEUED_TOTAL, MESSAGES_EVICTED_TOTAL, POLL_TIMEOUTS_TOTAL, SWEEP_FAILURES_TOTAL,
};
use crate::retention::RetentionPolicy;
use crate::sweep;
use crate::transport::{ConnectionContext, Transport};

/// Supplier attempts before falling back to a random id.
const MAX_SESSION_ID_ATTEMPTS: usize = 16;

/// Timing configuration for a [`ClientCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Sweep period, keepalive interval and poll parking limit. Also the
    /// longest an enqueue waits for the sequence clock.
    pub ctx_timeout: Duration,
    /// Unconditional retention window.
    pub strong_timeout: Duration,
    /// Conditional retention window.
    pub soft_timeout: Duration,
    /// A detached client expires after `ctx_timeout * idle_grace_factor`
    /// once its backlog is empty or it has also outlived the soft window.
    pub idle_grace_factor: u32,
}

impl CacheConfig {
    /// Build a config with the default idle grace factor.
    pub fn new(ctx_timeout: Duration, strong_timeout: Duration, soft_timeout: Duration) -> Self {
        Self {
            ctx_timeout,
            strong_timeout,
            soft_timeout,
            ..Self::default()
        }
    }

    /// Builder: idle grace factor (clamped to at least 1).
    #[must_use]
    pub fn with_idle_grace_factor(mut self, factor: u32) -> Self {
        self.idle_grace_factor = factor.max(1);
        self
    }

    /// How long a detached, empty client survives.
    pub fn idle_grace(&self) -> Duration {
        self.ctx_timeout.saturating_mul(self.idle_grace_factor.max(1))
    }

    fn client_timeouts(&self) -> ClientTimeouts {
        ClientTimeouts {
            ctx_ms: duration_ms(self.ctx_timeout),
            idle_grace_ms: duration_ms(self.idle_grace()),
            retention_ms: RetentionPolicy::new(self.strong_timeout, self.soft_timeout).soft_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ctx_timeout: Duration::from_secs(20),
            strong_timeout: Duration::from_secs(5),
            soft_timeout: Duration::from_secs(30),
            idle_grace_factor: 3,
        }
    }
}

/// Totals from one [`ClientCache::sweep_now`] pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Clients visited.
    pub clients: usize,
    /// Keepalive pings sent.
    pub pings: usize,
    /// Parked polls answered empty.
    pub polls_released: usize,
    /// Attachments dropped because the transport was gone.
    pub detached: usize,
    /// Backlog entries evicted.
    pub evicted: usize,
    /// Clients expired and removed.
    pub expired: usize,
    /// Clients whose step panicked.
    pub failures: usize,
}

/// Registry of every live [`Client`] plus the global message clock.
pub struct ClientCache {
    config: CacheConfig,
    policy: RetentionPolicy,
    clock: SequenceClock,
    time: Arc<dyn TimeSource>,
    clients: RwLock<HashMap<SessionId, Arc<Client>>>,
    cancel: CancellationToken,
}

impl ClientCache {
    /// Create a cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Create a cache reading time from `time`.
    pub fn with_time_source(config: CacheConfig, time: Arc<dyn TimeSource>) -> Self {
        let policy = RetentionPolicy::new(config.strong_timeout, config.soft_timeout);
        Self {
            config,
            policy,
            clock: SequenceClock::new(time.clone()),
            time,
            clients: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Timing configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Effective retention windows.
    pub fn retention(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Current time according to the cache's clock.
    pub fn now_ms(&self) -> i64 {
        self.time.now_ms()
    }

    /// Token cancelled on [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ── attach ──

    /// Attach `transport` to the caller's session, creating one if needed.
    ///
    /// Returns `None` when `ctx` carries no principal. If `ctx` names a
    /// live session owned by the same principal it is reused and replayed
    /// from `last`; otherwise a new client is registered under an id drawn
    /// from `supplier` (retried until unique).
    pub fn add_or_update_client<F>(
        &self,
        ctx: &ConnectionContext,
        transport: Arc<dyn Transport>,
        last: Stamp,
        supplier: F,
    ) -> Option<Arc<Client>>
    where
        F: FnMut() -> SessionId,
    {
        let Some(principal) = ctx.principal.as_ref() else {
            debug!(connection_id = %ctx.connection_id, "rejecting unauthenticated attach");
            return None;
        };
        let now = self.time.now_ms();

        if let Some(existing) = self.client_for(ctx) {
            if existing
                .set_context_and_replay(transport.clone(), last, now)
                .is_some()
            {
                return Some(existing);
            }
            let _ = self.remove(&existing);
        }

        let client = {
            let mut clients = self.clients.write();
            let session_id = unique_session_id(&clients, supplier);
            let client = Arc::new(Client::new(
                principal.clone(),
                session_id.clone(),
                self.config.client_timeouts(),
                now,
            ));
            let _ = clients.insert(session_id, client.clone());
            record_active(clients.len());
            client
        };

        let _ = client.set_context_and_replay(transport, last, now);
        info!(
            session_id = %client.session_id(),
            user_id = %principal.user_id,
            connection_id = %ctx.connection_id,
            "client registered"
        );
        Some(client)
    }

    // ── lookups ──

    /// The client for `session_id`, if it belongs to `principal`.
    pub fn client(&self, principal: &Principal, session_id: &SessionId) -> Option<Arc<Client>> {
        self.clients
            .read()
            .get(session_id)
            .filter(|c| c.principal() == principal)
            .cloned()
    }

    /// The client a connection context refers to.
    pub fn client_for(&self, ctx: &ConnectionContext) -> Option<Arc<Client>> {
        let principal = ctx.principal.as_ref()?;
        let session_id = ctx.session_id.as_ref()?;
        self.client(principal, session_id)
    }

    /// The client currently attached to `connection_id`.
    pub fn client_by_connection(&self, connection_id: &ConnectionId) -> Option<Arc<Client>> {
        self.clients()
            .into_iter()
            .find(|c| c.connection_id().as_ref() == Some(connection_id))
    }

    /// Snapshot of every registered client.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.read().values().cloned().collect()
    }

    /// Every client owned by `principal`.
    pub fn clients_for(&self, principal: &Principal) -> Vec<Arc<Client>> {
        self.clients
            .read()
            .values()
            .filter(|c| c.principal() == principal)
            .cloned()
            .collect()
    }

    /// Every client whose principal's username matches, ignoring case.
    pub fn clients_for_username(&self, username: &str) -> Vec<Arc<Client>> {
        self.clients
            .read()
            .values()
            .filter(|c| c.principal().matches_username(username))
            .cloned()
            .collect()
    }

    /// Whether `session_id` is registered.
    pub fn session_id_exists(&self, session_id: &SessionId) -> bool {
        self.clients.read().contains_key(session_id)
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    // ── sends ──

    /// Stamp `payload` once and hand it to every client in `targets`.
    ///
    /// The clock stays locked until every target has taken the message, so
    /// no client can see a later stamp before an earlier one.
    pub fn try_enqueue(&self, targets: &[Arc<Client>], payload: Value) -> Result<Stamp, DeliveryError> {
        let guard = self.clock.acquire(self.config.ctx_timeout)?;
        let stamp = guard.stamp();
        let message = Arc::new(Message::new(stamp, payload, &self.policy)?);
        let now = self.time.now_ms();

        let delivered = targets
            .iter()
            .filter(|c| c.enqueue(message.clone(), now))
            .count();
        drop(guard);
        counter!(MESSAGES_ENQUEUED_TOTAL).increment(1);
        debug!(%stamp, targets = targets.len(), delivered, "message enqueued");
        Ok(stamp)
    }

    /// Fire-and-forget [`try_enqueue`](Self::try_enqueue). Failures are
    /// logged and the message is dropped.
    pub fn enqueue(&self, targets: &[Arc<Client>], payload: Value) -> &Self {
        if let Err(error) = self.try_enqueue(targets, payload) {
            counter!(MESSAGES_DROPPED_TOTAL).increment(1);
            warn!(%error, targets = targets.len(), "dropping outbound message");
        }
        self
    }

    /// Send to every registered client.
    pub fn broadcast(&self, payload: Value) -> &Self {
        self.enqueue(&self.clients(), payload)
    }

    /// Send to every session of `principal`.
    pub fn send_to_principal(&self, principal: &Principal, payload: Value) -> &Self {
        self.enqueue(&self.clients_for(principal), payload)
    }

    /// Send to every session whose username matches, ignoring case.
    pub fn send_to_username(&self, username: &str, payload: Value) -> &Self {
        self.enqueue(&self.clients_for_username(username), payload)
    }

    /// Send to a single client.
    pub fn send_to_client(&self, client: &Arc<Client>, payload: Value) -> &Self {
        self.enqueue(std::slice::from_ref(client), payload)
    }

    /// Send to the session a connection context refers to, if any.
    pub fn send_to_context(&self, ctx: &ConnectionContext, payload: Value) -> &Self {
        match self.client_for(ctx) {
            Some(client) => self.send_to_client(&client, payload),
            None => self,
        }
    }

    // ── connection events ──

    /// Record an acknowledgment from the client `ctx` refers to.
    ///
    /// Returns the new high-water mark, or `None` if no such client exists.
    pub fn last_received(&self, ctx: &ConnectionContext, stamp: Stamp) -> Option<Stamp> {
        let client = self.client_for(ctx)?;
        Some(client.last_received(stamp, self.time.now_ms()))
    }

    /// The connection in `ctx` went away.
    pub fn detach(&self, ctx: &ConnectionContext) -> bool {
        self.client_for(ctx)
            .is_some_and(|c| c.detach(&ctx.connection_id, self.time.now_ms()))
    }

    // ── removal ──

    /// Deregister `client` and expire it.
    pub fn remove(&self, client: &Arc<Client>) -> bool {
        let removed = {
            let mut clients = self.clients.write();
            let owned = clients
                .get(client.session_id())
                .is_some_and(|c| Arc::ptr_eq(c, client));
            let removed = owned && clients.remove(client.session_id()).is_some();
            record_active(clients.len());
            removed
        };
        let _ = client.expire();
        if removed {
            counter!(CLIENTS_EXPIRED_TOTAL).increment(1);
            debug!(session_id = %client.session_id(), "client removed");
        }
        removed
    }

    /// Explicit logout of one session.
    pub fn remove_session(&self, principal: &Principal, session_id: &SessionId) -> bool {
        self.client(principal, session_id)
            .is_some_and(|c| self.remove(&c))
    }

    /// Remove every session of `principal`. Returns how many were removed.
    pub fn remove_principal(&self, principal: &Principal) -> usize {
        let removed = self
            .clients_for(principal)
            .iter()
            .filter(|c| self.remove(c))
            .count();
        if removed > 0 {
            info!(user_id = %principal.user_id, removed, "principal sessions removed");
        }
        removed
    }

    // ── sweep ──

    /// Run one timeout pass over a snapshot of the registry.
    ///
    /// A panic while processing one client is logged and counted; the
    /// rest of the pass continues.
    pub fn sweep_now(&self) -> SweepReport {
        let now = self.time.now_ms();
        let snapshot = self.clients();
        let mut report = SweepReport {
            clients: snapshot.len(),
            ..SweepReport::default()
        };

        for client in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| client.process_timeout(now))) {
                Ok(outcome) => {
                    report.pings += usize::from(outcome.pinged);
                    report.polls_released += usize::from(outcome.poll_released);
                    report.detached += usize::from(outcome.detached);
                    report.evicted += outcome.evicted;
                    if outcome.expired && self.remove(client) {
                        report.expired += 1;
                    }
                }
                Err(_) => {
                    report.failures += 1;
                    counter!(SWEEP_FAILURES_TOTAL).increment(1);
                    error!(session_id = %client.session_id(), "client sweep step panicked");
                }
            }
        }

        counter!(KEEPALIVE_PINGS_TOTAL).increment(report.pings as u64);
        counter!(POLL_TIMEOUTS_TOTAL).increment(report.polls_released as u64);
        counter!(MESSAGES_EVICTED_TOTAL).increment(report.evicted as u64);
        report
    }

    /// Start the periodic sweep. It stops on [`shutdown`](Self::shutdown)
    /// or when the last strong reference to the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        sweep::spawn_sweeper(self)
    }

    /// Stop the sweeper and expire every client, releasing parked polls.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let drained: Vec<Arc<Client>> = {
            let mut clients = self.clients.write();
            let drained = clients.drain().map(|(_, c)| c).collect();
            record_active(0);
            drained
        };
        for client in &drained {
            let _ = client.expire();
        }
        info!(clients = drained.len(), "client cache shut down");
    }
}

impl Drop for ClientCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("config", &self.config)
            .field("clients", &self.client_count())
            .finish_non_exhaustive()
    }
}

fn unique_session_id<F>(clients: &HashMap<SessionId, Arc<Client>>, mut supplier: F) -> SessionId
where
    F: FnMut() -> SessionId,
{
    for _ in 0..MAX_SESSION_ID_ATTEMPTS {
        let candidate = supplier();
        if !candidate.is_blank() && !clients.contains_key(&candidate) {
            return candidate;
        }
    }
    warn!(
        attempts = MAX_SESSION_ID_ATTEMPTS,
        "session id supplier kept colliding, using a random id"
    );
    loop {
        let candidate = SessionId::new();
        if !clients.contains_key(&candidate) {
            return candidate;
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(count: usize) {
    gauge!(CLIENTS_ACTIVE).set(count as f64);
}
