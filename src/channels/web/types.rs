//! Wire types for the inbound HTTP API.

use serde::{Deserialize, Serialize};

use crate::agent::intent::TaskResponse;

/// Body of `POST /query`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// The chat platform's user id; keys the session.
    pub session_id: String,
}

/// Reply envelope of `POST /query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub result: TaskResponse,
}

/// Diagnostics reply of `GET /session/{session_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

/// Reply of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub channel: &'static str,
}
