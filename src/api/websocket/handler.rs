//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{ws::rejection::WebSocketUpgradeRejection, ws::WebSocketUpgrade, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::session::serve_socket;
use super::state::AppState;
use crate::api::auth::AuthError;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Bearer token; browsers cannot set headers on an upgrade request
    pub token: Option<String>,
}

/// Admit the caller, then upgrade. Admission is checked before the upgrade
/// so a rejected caller gets a plain 401.
pub async fn ws_handler(
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let credential = params
        .token
        .filter(|token| !token.is_empty())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        });

    let Some(credential) = credential else {
        return unauthorized("token required");
    };

    let principal = match state.authenticator.authenticate(&credential) {
        Ok(principal) => principal,
        Err(AuthError::MissingToken) => return unauthorized("token required"),
        Err(e) => {
            debug!(error = %e, "Rejected websocket admission");
            return unauthorized("invalid token");
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max = state.session.max_frame_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| serve_socket(socket, principal, state))
}

fn unauthorized(reason: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": reason }))).into_response()
}
