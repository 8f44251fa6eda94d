//! lanchat-api — local HTTP control surface for a Lanchat node.

pub mod event_log;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use event_log::EventLog;
pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handlers::handle_status))
        .route("/peers", get(handlers::handle_peers))
        .route("/transfers", get(handlers::handle_transfers))
        .route("/events", get(handlers::handle_events))
        .route("/username", post(handlers::handle_set_username))
        .route("/presence/broadcast", post(handlers::handle_broadcast_presence))
        .route("/messages/send", post(handlers::handle_send_message))
        .route("/files/send", post(handlers::handle_send_file))
        .route("/files/respond", post(handlers::handle_respond))
        .route("/files/save-path", post(handlers::handle_save_path))
        .route("/transfers/cancel", post(handlers::handle_cancel))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

pub async fn serve(state: ApiState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!(port, "API listening on 127.0.0.1");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
