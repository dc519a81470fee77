//! Client-to-server frames.
//!
//! Both transports accept the same shape:
//!
//! ```json
//! {"ack": {"timestamp": 1700000000000, "sequence": 3}, "data": {...}}
//! ```
//!
//! `ack` is forwarded to the client's high-water mark. `data`, if present,
//! is handed to the configured [`InboundHandler`]. Either may be omitted.

use std::sync::Arc;

use async_trait::async_trait;
use courier_delivery::{ClientCache, ConnectionContext, DeliveryMode, Stamp};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::metrics::{INBOUND_FRAMES_TOTAL, INBOUND_INVALID_TOTAL};

/// A parsed inbound frame.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct InboundFrame {
    /// Piggy-backed acknowledgment.
    #[serde(default)]
    pub ack: Option<Stamp>,
    /// Application payload.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Parse raw frame text.
pub fn parse_frame(text: &str) -> Result<InboundFrame, serde_json::Error> {
    serde_json::from_str(text)
}

/// An application payload sent by a client.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Who sent it; `principal` and `session_id` are always set.
    pub context: ConnectionContext,
    /// Which transport carried it.
    pub mode: DeliveryMode,
    /// The `data` member of the frame.
    pub data: Value,
}

/// Application hook for inbound payloads.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// Handle one payload. Replies go out through `cache`.
    async fn handle(&self, cache: &Arc<ClientCache>, message: InboundMessage);
}

/// Default handler: logs and discards.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingInboundHandler;

#[async_trait]
impl InboundHandler for LoggingInboundHandler {
    async fn handle(&self, _cache: &Arc<ClientCache>, message: InboundMessage) {
        info!(
            session_id = ?message.context.session_id,
            mode = %message.mode,
            "inbound message"
        );
    }
}

/// Parse `text`, apply its ack and pass its payload on.
pub async fn dispatch(
    cache: &Arc<ClientCache>,
    handler: &dyn InboundHandler,
    ctx: &ConnectionContext,
    mode: DeliveryMode,
    text: &str,
) -> Result<(), serde_json::Error> {
    let frame = match parse_frame(text) {
        Ok(frame) => frame,
        Err(error) => {
            counter!(INBOUND_INVALID_TOTAL).increment(1);
            warn!(%error, connection_id = %ctx.connection_id, "invalid inbound frame");
            return Err(error);
        }
    };
    counter!(INBOUND_FRAMES_TOTAL, "transport" => mode.as_str()).increment(1);

    if let Some(stamp) = frame.ack {
        let high_water = cache.last_received(ctx, stamp);
        debug!(%stamp, ?high_water, "ack");
    }
    if let Some(data) = frame.data {
        handler
            .handle(
                cache,
                InboundMessage {
                    context: ctx.clone(),
                    mode,
                    data,
                },
            )
            .await;
    }
    Ok(())
}
