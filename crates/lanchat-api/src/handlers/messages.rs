//! /messages/send, /username, /presence/broadcast handlers.

use std::net::IpAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{bad_request, node_error, ApiError, ApiState};

#[derive(Serialize)]
pub struct Ack {
    pub ok: bool,
}

// ── /messages/send ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub to: IpAddr,
    pub text: String,
}

pub async fn handle_send_message(
    State(state): State<ApiState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Ack>, ApiError> {
    if req.text.is_empty() {
        return Err(bad_request("empty message"));
    }
    state
        .node
        .send_message(&req.text, req.to)
        .await
        .map_err(node_error)?;
    Ok(Json(Ack { ok: true }))
}

// ── /username ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct UsernameResponse {
    pub username: String,
}

pub async fn handle_set_username(
    State(state): State<ApiState>,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<UsernameResponse>, ApiError> {
    let name = req.username.trim();
    if name.is_empty() {
        return Err(bad_request("empty username"));
    }
    // The name is kept even if the announcement fails; the next heartbeat
    // carries it.
    if let Err(e) = state.node.set_username(name).await {
        tracing::warn!(error = %e, "username broadcast failed");
    }
    Ok(Json(UsernameResponse {
        username: state.node.username(),
    }))
}

// ── /presence/broadcast ───────────────────────────────────────────────────────

pub async fn handle_broadcast_presence(
    State(state): State<ApiState>,
) -> Result<Json<Ack>, ApiError> {
    state
        .node
        .broadcast_presence_now()
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
    Ok(Json(Ack { ok: true }))
}
