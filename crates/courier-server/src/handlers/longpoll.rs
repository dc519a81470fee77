//! Long-poll endpoints.
//!
//! `GET` parks until the session has something to deliver, the sweep
//! releases it empty, or the handler's own safety timeout fires. `POST`
//! carries one inbound frame from a polling client.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use courier_core::{ConnectionId, SessionId};
use courier_delivery::{ClientCache, ConnectionContext, DeliveryMode};
use metrics::counter;
use tracing::{debug, instrument};

use super::{ConnectQuery, SESSION_ID_HEADER, unauthorized};
use crate::inbound;
use crate::metrics::{POLL_REQUESTS_TOTAL, POLL_SAFETY_TIMEOUTS_TOTAL};
use crate::server::AppState;
use crate::transport::{PollTransport, batch_body};

/// Detaches the parked request if the handler future is dropped early.
struct DetachOnDrop {
    cache: Arc<ClientCache>,
    ctx: ConnectionContext,
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        let _ = self.cache.detach(&self.ctx);
    }
}

/// `GET {long_poll_path}`: park until there is something to say.
#[instrument(skip_all, fields(session_id))]
pub async fn poll_handler(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Response {
    counter!(POLL_REQUESTS_TOTAL).increment(1);
    let Some(principal) = state.auth.authenticate(&headers, query.token.as_deref()) else {
        return unauthorized("longpoll");
    };

    let connection_id = ConnectionId::new();
    let (transport, rx) = PollTransport::new(connection_id.clone());
    let mut ctx = ConnectionContext::new(connection_id, Some(principal))
        .with_session(query.session_id());
    let last = query.last();

    // The declared position doubles as an acknowledgment.
    if ctx.session_id.is_some() {
        let _ = state.cache.last_received(&ctx, last);
    }

    let Some(client) = state
        .cache
        .add_or_update_client(&ctx, transport, last, SessionId::new)
    else {
        return unauthorized("longpoll");
    };
    let session_id = client.session_id().clone();
    let _ = tracing::Span::current().record("session_id", session_id.as_str());
    ctx.session_id = Some(session_id.clone());

    let _guard = DetachOnDrop {
        cache: state.cache.clone(),
        ctx,
    };

    let frames = match tokio::time::timeout(state.config.poll_safety_timeout(), rx).await {
        Ok(Ok(frames)) => frames,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            counter!(POLL_SAFETY_TIMEOUTS_TOTAL).increment(1);
            debug!("poll safety timeout");
            Vec::new()
        }
    };
    debug!(frames = frames.len(), "poll answered");

    let mut response = (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        batch_body(&frames),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        let _ = response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

/// `POST {long_poll_path}?sessionId=…`: one inbound frame.
pub async fn post_handler(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(principal) = state.auth.authenticate(&headers, query.token.as_deref()) else {
        return unauthorized("longpoll");
    };
    let Some(session_id) = query.session_id() else {
        return (StatusCode::BAD_REQUEST, "sessionId is required").into_response();
    };
    let ctx = ConnectionContext::new(ConnectionId::new(), Some(principal)).with_session(Some(session_id));
    if state.cache.client_for(&ctx).is_none() {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    }

    match inbound::dispatch(
        &state.cache,
        state.inbound.as_ref(),
        &ctx,
        DeliveryMode::LongPoll,
        &body,
    )
    .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => (StatusCode::BAD_REQUEST, format!("invalid frame: {error}")).into_response(),
    }
}
