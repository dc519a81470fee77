//! `CourierServer`: Axum HTTP, WebSocket and long-poll server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::Json;
use axum::routing::get;
use courier_delivery::ClientCache;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::TokenAuthenticator;
use crate::config::ServerConfig;
use crate::errors::Result;
use crate::handlers::{longpoll, ws};
use crate::health::{self, HealthResponse};
use crate::inbound::{InboundHandler, LoggingInboundHandler};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Delivery core.
    pub cache: Arc<ClientCache>,
    /// Credential lookup.
    pub auth: Arc<TokenAuthenticator>,
    /// Application hook for inbound payloads.
    pub inbound: Arc<dyn InboundHandler>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

/// The courier server.
pub struct CourierServer {
    config: Arc<ServerConfig>,
    cache: Arc<ClientCache>,
    auth: Arc<TokenAuthenticator>,
    inbound: Arc<dyn InboundHandler>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl CourierServer {
    /// Create a server over `cache`. Inbound payloads are logged and dropped
    /// until a handler is set with [`with_inbound_handler`](Self::with_inbound_handler).
    pub fn new(
        config: ServerConfig,
        cache: Arc<ClientCache>,
        auth: TokenAuthenticator,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            auth: Arc::new(auth),
            inbound: Arc::new(LoggingInboundHandler),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Builder: application hook for inbound payloads.
    #[must_use]
    pub fn with_inbound_handler(mut self, handler: Arc<dyn InboundHandler>) -> Self {
        self.inbound = handler;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            cache: self.cache.clone(),
            auth: self.auth.clone(),
            inbound: self.inbound.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(&self.config.ws_path, get(ws::ws_handler))
            .route(
                &self.config.long_poll_path,
                get(longpoll::poll_handler).post(longpoll::post_handler),
            )
            .layer(DefaultBodyLimit::max(self.config.max_message_size))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve in the background.
    ///
    /// The listener stops accepting once the shutdown token is cancelled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_address()).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(
            addr = %local_addr,
            ws_path = %self.config.ws_path,
            long_poll_path = %self.config.long_poll_path,
            "courier server listening"
        );

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Get the delivery core.
    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.cache.client_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use courier_core::Principal;
    use courier_delivery::CacheConfig;
    use std::time::Duration;
    use tower::ServiceExt;

    fn make_server() -> CourierServer {
        let config = ServerConfig {
            ctx_timeout_ms: 100,
            ..ServerConfig::default()
        };
        let cache = Arc::new(ClientCache::new(CacheConfig::new(
            Duration::from_millis(100),
            Duration::from_secs(5),
            Duration::from_secs(30),
        )));
        let auth = TokenAuthenticator::default()
            .with_token("secret", Principal::new("u1", "alice"));
        CourierServer::new(config, cache, auth, metrics::detached_handle())
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.cache().client_count(), 0);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["clients"], 0);
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let server = make_server();
        server.shutdown().shutdown();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let parsed = body_json(server.router().oneshot(req).await.unwrap()).await;
        assert_eq!(parsed["status"], "shuttingDown");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let app = make_server().router();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn poll_without_credentials_is_401() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/longpoll/panel")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn poll_returns_pending_messages() {
        let server = make_server();
        let app = server.router();

        // First poll registers the session and parks until the push.
        let cache = server.cache().clone();
        let pusher = tokio::spawn(async move {
            for _ in 0..100 {
                if cache.client_count() > 0 {
                    let _ = cache.broadcast(serde_json::json!({"n": 1}));
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let req = Request::builder()
            .uri("/longpoll/panel?token=secret")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        pusher.await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(crate::handlers::SESSION_ID_HEADER));
        let parsed = body_json(resp).await;
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["data"]["n"], 1);
        assert!(parsed[0]["metadata"]["timestamp"].is_number());
    }

    #[tokio::test]
    async fn post_requires_session() {
        let app = make_server().router();
        let req = Request::builder()
            .method("POST")
            .uri("/longpoll/panel?token=secret")
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_to_unknown_session_is_404() {
        let app = make_server().router();
        let req = Request::builder()
            .method("POST")
            .uri("/longpoll/panel?token=secret&sessionId=nope")
            .body(Body::from(r#"{"data":{}}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_rejects_plain_get() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/ws/panel?token=secret")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
