//! /files/*, /transfers/cancel handlers — file transfer endpoints.

use std::net::IpAddr;
use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use lanchat_services::file_transfer::receive::is_plain_filename;

use super::messages::Ack;
use super::{bad_request, node_error, ApiError, ApiState};

// ── /files/send ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendFileRequest {
    pub to: IpAddr,
    pub path: PathBuf,
}

#[derive(Serialize)]
pub struct SendFileResponse {
    pub filename: String,
    pub bytes: u64,
    pub digest: String,
}

pub async fn handle_send_file(
    State(state): State<ApiState>,
    Json(req): Json<SendFileRequest>,
) -> Result<Json<SendFileResponse>, ApiError> {
    let offer = state
        .node
        .request_file_send(&req.path, req.to)
        .await
        .map_err(node_error)?;
    Ok(Json(SendFileResponse {
        filename: offer.filename,
        bytes: offer.size,
        digest: lanchat_core::digest::to_hex(&offer.digest),
    }))
}

// ── /files/respond ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RespondRequest {
    pub from: IpAddr,
    pub filename: String,
    pub accept: bool,
    /// Where to write the file. Defaults to the download directory.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct RespondResponse {
    pub accepted: bool,
    pub save_path: Option<String>,
}

pub async fn handle_respond(
    State(state): State<ApiState>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    if !is_plain_filename(&req.filename) {
        return Err(bad_request(format!("invalid filename {:?}", req.filename)));
    }

    let mut bound = None;
    if req.accept {
        let path = match req.save_path {
            Some(p) => p,
            None => {
                let dir = &state.node.config().transfer.download_dir;
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
                dir.join(&req.filename)
            }
        };
        state.node.set_save_path(&req.filename, path.clone());
        bound = Some(path.display().to_string());
    }

    state
        .node
        .respond_to_file_request(&req.filename, req.from, req.accept)
        .await
        .map_err(node_error)?;

    Ok(Json(RespondResponse {
        accepted: req.accept,
        save_path: bound,
    }))
}

// ── /files/save-path ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SavePathRequest {
    pub filename: String,
    pub path: PathBuf,
}

pub async fn handle_save_path(
    State(state): State<ApiState>,
    Json(req): Json<SavePathRequest>,
) -> Result<Json<Ack>, ApiError> {
    if !is_plain_filename(&req.filename) {
        return Err(bad_request(format!("invalid filename {:?}", req.filename)));
    }
    state.node.set_save_path(&req.filename, req.path);
    Ok(Json(Ack { ok: true }))
}

// ── /transfers/cancel ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CancelRequest {
    pub filename: String,
}

pub async fn handle_cancel(
    State(state): State<ApiState>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Ack>, ApiError> {
    if state.node.cancel_transfer(&req.filename) {
        Ok(Json(Ack { ok: true }))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            format!("no active transfer named {:?}", req.filename),
        ))
    }
}
