//! /status, /peers, /transfers, /events handlers.

use std::net::IpAddr;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use lanchat_services::{Operation, TransferStatus};

use super::ApiState;
use crate::event_log::LoggedEvent;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub username: String,
    pub udp_port: u16,
    pub tcp_port: u16,
    pub peers: usize,
    pub transfers: usize,
    pub download_dir: String,
    pub last_event: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let node = &state.node;
    Json(StatusResponse {
        username: node.username(),
        udp_port: node.udp_port(),
        tcp_port: node.tcp_port(),
        peers: node.peers().len(),
        transfers: node.transfers().len(),
        download_dir: node.config().transfer.download_dir.display().to_string(),
        last_event: state.events.last_seq(),
    })
}

// ── /peers ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

#[derive(Serialize)]
pub struct PeerInfo {
    pub ip: IpAddr,
    pub username: String,
    pub last_seen_secs: u64,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let peers = state
        .node
        .peers()
        .into_iter()
        .map(|p| PeerInfo {
            ip: p.ip,
            username: p.username,
            last_seen_secs: p.last_seen.elapsed().as_secs(),
        })
        .collect();
    Json(PeersResponse { peers })
}

// ── /transfers ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TransfersResponse {
    pub transfers: Vec<TransferInfo>,
}

#[derive(Serialize)]
pub struct TransferInfo {
    pub filename: String,
    pub size: u64,
    pub digest: String,
    pub operation: Operation,
    pub status: TransferStatus,
    pub peer: IpAddr,
    pub percent: Option<u8>,
}

pub async fn handle_transfers(State(state): State<ApiState>) -> Json<TransfersResponse> {
    let mut transfers: Vec<TransferInfo> = state
        .node
        .transfers()
        .into_iter()
        .map(|t| TransferInfo {
            digest: lanchat_core::digest::to_hex(&t.digest),
            filename: t.filename,
            size: t.size,
            operation: t.operation,
            status: t.status,
            peer: t.peer,
            percent: t.percent,
        })
        .collect();
    transfers.sort_by(|a, b| a.filename.cmp(&b.filename));
    Json(TransfersResponse { transfers })
}

// ── /events ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<LoggedEvent>,
    pub last_seq: u64,
}

pub async fn handle_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    Json(EventsResponse {
        events: state.events.since(query.since),
        last_seq: state.events.last_seq(),
    })
}
