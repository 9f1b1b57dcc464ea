//! HTTP server layer: axum router, per-session handlers, CORS.
//!
//! URL surface: `/status`, plus per-backend `sse` + `messages/` (SSE pair)
//! and `mcp` (Streamable HTTP) endpoints — at the root for the default
//! server and under `/servers/{name}/` for named servers.

pub mod handlers;
pub mod middleware;
pub mod sessions;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ProxySettings;
use crate::core::errors::ProxyError;
use crate::registry::BackendRegistry;
use middleware::CorsPolicy;
use sessions::SessionManager;

/// Shared dependencies for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BackendRegistry>,
    pub sessions: Arc<SessionManager>,
    pub settings: Arc<ProxySettings>,
}

/// Build the router. Routes are fixed at startup; unknown named servers
/// resolve to 404 at request time.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/sse", get(handlers::handle_sse_default))
        .route("/messages/", post(handlers::handle_messages))
        .route(
            "/mcp",
            post(handlers::handle_mcp_post_default)
                .get(handlers::handle_mcp_get)
                .delete(handlers::handle_mcp_delete),
        )
        .route("/servers/{name}/sse", get(handlers::handle_sse_named))
        .route("/servers/{name}/messages/", post(handlers::handle_messages))
        .route(
            "/servers/{name}/mcp",
            post(handlers::handle_mcp_post_named)
                .get(handlers::handle_mcp_get)
                .delete(handlers::handle_mcp_delete),
        );

    if !state.settings.allow_origins.is_empty() {
        let policy = Arc::new(CorsPolicy::new(state.settings.allow_origins.clone()));
        router = router.layer(axum::middleware::from_fn_with_state(
            policy,
            middleware::cors,
        ));
    }

    router.with_state(state)
}

/// Bind the listen socket described by `settings`.
pub async fn bind(settings: &ProxySettings) -> Result<TcpListener, ProxyError> {
    let addr = format!("{}:{}", settings.host, settings.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| ProxyError::BindFailed { addr, source: e })
}

/// Bind and serve until `shutdown` fires, then cancel live sessions (in
/// reverse creation order) and wait for their tasks to finish.
pub async fn serve(
    settings: ProxySettings,
    registry: BackendRegistry,
    shutdown: CancellationToken,
) -> Result<(), ProxyError> {
    let listener = bind(&settings).await?;
    serve_on(listener, settings, registry, shutdown).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    settings: ProxySettings,
    registry: BackendRegistry,
    shutdown: CancellationToken,
) -> Result<(), ProxyError> {
    let sessions = Arc::new(SessionManager::new());
    let state = AppState {
        registry: Arc::new(registry),
        sessions: sessions.clone(),
        settings: Arc::new(settings),
    };
    let app = create_router(state);

    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "serving incoming requests");

    // Tearing sessions down closes their event streams, which is what lets
    // the graceful shutdown complete while SSE connections are open.
    let graceful = async move {
        shutdown.cancelled().await;
        info!("shutdown requested, closing sessions");
        sessions.shutdown_all().await;
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .await
        .map_err(ProxyError::Io)?;
    info!("server stopped");
    Ok(())
}
