//! lanchatd — Lanchat LAN messenger daemon.

use anyhow::{Context, Result};

use lanchat_api::{ApiState, EventLog};
use lanchat_core::LanchatConfig;
use lanchat_services::discovery::interfaces;
use lanchat_services::Coordinator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = LanchatConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = LanchatConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LanchatConfig::default()
    });
    tracing::info!(
        username = %config.identity.username,
        udp_port = config.network.udp_port,
        tcp_port = config.network.tcp_port,
        "lanchatd starting"
    );

    let local_addrs = interfaces::local_addrs();
    tracing::info!(addrs = ?local_addrs, "local addresses");

    let download_dir = config.transfer.download_dir.clone();
    if let Err(e) = tokio::fs::create_dir_all(&download_dir).await {
        tracing::warn!(path = %download_dir.display(), error = %e, "failed to create download directory");
    }

    let api_port = config.network.api_port;
    let node = Coordinator::bind(config, local_addrs)
        .await
        .context("failed to bind node sockets")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let events = EventLog::new();
    let _collector = events.spawn_collector(node.subscribe());

    let node_task = tokio::spawn(node.clone().run(shutdown_tx.clone()));

    let api_task = {
        let state = ApiState {
            node: node.clone(),
            events,
        };
        tokio::spawn(async move {
            if let Err(e) = lanchat_api::serve(state, api_port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = node_task          => tracing::error!("node exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
    }

    Ok(())
}
