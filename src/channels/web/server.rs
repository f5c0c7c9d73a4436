//! HTTP server wiring for the query API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::agent::router::TaskRouter;
use crate::error::ChannelError;
use crate::session::SessionStore;

use super::types::{HealthResponse, QueryRequest, QueryResponse, SessionInfoResponse};

/// Shared state for all API handlers.
pub struct ApiState {
    pub router: Arc<TaskRouter>,
    pub sessions: Arc<dyn SessionStore>,
}

/// Start the HTTP API server.
///
/// Returns the bound address (useful when binding port 0 in tests) and a
/// sender that triggers graceful shutdown when dropped or fired.
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<ApiState>,
) -> Result<(SocketAddr, oneshot::Sender<()>), ChannelError> {
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "web".to_string(),
                reason: format!("Failed to bind to {addr}: {e}"),
            })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| ChannelError::StartupFailed {
            name: "web".to_string(),
            reason: format!("Failed to get local addr: {e}"),
        })?;

    // The API is consumed by chat relays and the browser frontend, which
    // run on other origins; replies carry no credentials or cookies.
    let app = Router::new()
        .route("/query", post(query_handler))
        .route("/session/{session_id}", get(session_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("web API shutting down");
            })
            .await
        {
            tracing::error!("web API server error: {e}");
        }
    });

    tracing::info!(%bound_addr, "web API listening");
    Ok((bound_addr, shutdown_tx))
}

async fn query_handler(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }
    if req.session_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "session_id must not be empty".to_string(),
        ));
    }

    // The query text itself is never logged: during a pending payment it
    // is the user's secret key.
    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, session_id = %req.session_id.trim(), "query received");

    let result = state.router.handle(req.session_id.trim(), &req.query).await;
    tracing::info!(%request_id, task = %result.task, "query answered");
    Ok(Json(QueryResponse { result }))
}

async fn session_handler(
    State(state): State<Arc<ApiState>>,
    Path(session_id): Path<String>,
) -> Json<SessionInfoResponse> {
    let session = state.sessions.get(&session_id).await;
    Json(SessionInfoResponse {
        session_id,
        authenticated: session.authenticated,
        user_id: session.user_id,
        email: session.email,
    })
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        channel: "web",
    })
}
