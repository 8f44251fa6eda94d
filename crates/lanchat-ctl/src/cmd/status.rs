//! Daemon status, peers, transfers, and events commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    username: String,
    udp_port: u16,
    tcp_port: u16,
    peers: usize,
    transfers: usize,
    download_dir: String,
    last_event: u64,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    ip: String,
    username: String,
    last_seen_secs: u64,
}

#[derive(Deserialize)]
struct TransfersResponse {
    transfers: Vec<TransferInfo>,
}

#[derive(Deserialize)]
struct TransferInfo {
    filename: String,
    size: u64,
    operation: String,
    status: String,
    peer: String,
    percent: Option<u8>,
}

#[derive(Deserialize)]
struct EventsResponse {
    events: Vec<serde_json::Value>,
    last_seq: u64,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Lanchat Node Status");
    println!("═══════════════════════════════════════");
    println!("  Username         : {}", resp.username);
    println!("  UDP port         : {}", resp.udp_port);
    println!("  TCP port         : {}", resp.tcp_port);
    println!("  Peers online     : {}", resp.peers);
    println!("  Active transfers : {}", resp.transfers);
    println!("  Download dir     : {}", resp.download_dir);
    println!("  Last event       : #{}", resp.last_event);

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers online.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ {}", p.username);
        println!("  │  ip        : {}", p.ip);
        println!("  └─ last seen : {}s ago", p.last_seen_secs);
    }

    Ok(())
}

pub async fn cmd_transfers(port: u16) -> Result<()> {
    let resp: TransfersResponse = get_json(&format!("{}/transfers", base_url(port))).await?;

    if resp.transfers.is_empty() {
        println!("No active transfers.");
        return Ok(());
    }

    for t in &resp.transfers {
        let progress = t
            .percent
            .map(|p| format!("{p}%"))
            .unwrap_or_else(|| "-".to_string());
        println!("  ┌─ {}", t.filename);
        println!("  │  {} {} {}", t.operation, if t.operation == "send" { "to" } else { "from" }, t.peer);
        println!("  │  size     : {} bytes", t.size);
        println!("  │  status   : {}", t.status);
        println!("  └─ progress : {}", progress);
    }

    Ok(())
}

pub async fn cmd_events(port: u16, since: u64) -> Result<()> {
    let resp: EventsResponse =
        get_json(&format!("{}/events?since={}", base_url(port), since)).await?;

    for event in &resp.events {
        println!("{}", event);
    }
    if resp.events.is_empty() {
        println!("No events after #{}.", since);
    }
    println!("(last event #{})", resp.last_seq);

    Ok(())
}
