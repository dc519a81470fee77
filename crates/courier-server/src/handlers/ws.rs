//! WebSocket endpoint.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use courier_core::{ConnectionId, Principal, SessionId};
use courier_delivery::{ConnectionContext, DeliveryMode};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::{ConnectQuery, unauthorized};
use crate::inbound;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::server::AppState;
use crate::transport::{Outbound, WsTransport};

/// `GET {ws_path}`: authenticate, then upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(principal) = state.auth.authenticate(&headers, query.token.as_deref()) else {
        return unauthorized("ws");
    };
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, principal, query))
}

/// Drive one socket until either side closes or the server shuts down.
#[instrument(skip_all, fields(user_id = %principal.user_id, connection_id))]
async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal, query: ConnectQuery) {
    let connection_id = ConnectionId::new();
    let _ = tracing::Span::current().record("connection_id", connection_id.as_str());

    let (transport, rx) = WsTransport::new(
        connection_id.clone(),
        state.config.outbound_buffer,
        state.shutdown.token().child_token(),
    );
    let mut ctx = ConnectionContext::new(connection_id, Some(principal)).with_session(query.session_id());

    // The writer drains the queue before the client attaches, so the replay
    // never waits on a full channel.
    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(sink, rx, transport.close_token()));

    let Some(client) =
        state
            .cache
            .add_or_update_client(&ctx, transport.clone(), query.last(), SessionId::new)
    else {
        transport.close();
        let _ = writer.await;
        return;
    };
    ctx.session_id = Some(client.session_id().clone());

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(session_id = %client.session_id(), last = %query.last(), "websocket attached");

    read_loop(stream, &state, &ctx, &mut writer).await;

    transport.close();
    let _ = state.cache.detach(&ctx);
    writer.abort();

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(dropped_frames = transport.dropped_frames(), "websocket closed");
}

async fn write_loop<S>(mut sink: S, mut rx: mpsc::Receiver<Outbound>, cancel: CancellationToken)
where
    S: futures::Sink<Message> + Unpin,
{
    loop {
        let item = tokio::select! {
            item = rx.recv() => item,
            () = cancel.cancelled() => None,
        };
        let sent = match item {
            Some(Outbound::Text(text)) => sink.send(Message::Text(text.to_string().into())).await,
            Some(Outbound::Batch(frames)) => {
                let mut sent = Ok(());
                for text in frames {
                    sent = sink.feed(Message::Text(text.to_string().into())).await;
                    if sent.is_err() {
                        break;
                    }
                }
                match sent {
                    Ok(()) => sink.flush().await,
                    Err(error) => Err(error),
                }
            }
            Some(Outbound::Ping) => {
                trace!("sending ping");
                sink.send(Message::Ping(Vec::new().into())).await
            }
            Some(Outbound::Close) | None => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };
        if sent.is_err() {
            break;
        }
    }
}

async fn read_loop<S>(
    mut stream: S,
    state: &AppState,
    ctx: &ConnectionContext,
    writer: &mut tokio::task::JoinHandle<()>,
) where
    S: futures::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = &mut *writer => {
                debug!("writer finished");
                return;
            }
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                if let Err(error) = inbound::dispatch(
                    &state.cache,
                    state.inbound.as_ref(),
                    ctx,
                    DeliveryMode::WebSocket,
                    text.as_str(),
                )
                .await
                {
                    debug!(%error, "inbound frame rejected");
                }
            }
            Some(Ok(Message::Binary(_))) => warn!("ignoring binary frame"),
            Some(Ok(Message::Close(_))) | None => return,
            Some(Err(error)) => {
                debug!(%error, "websocket read error");
                return;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
        }
    }
}
