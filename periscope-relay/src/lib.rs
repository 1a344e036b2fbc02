//! Signaling relay: forwards negotiation messages between connected peers
//! without interpreting them.

mod hub;
mod ws;

pub use hub::{ConnId, Hub};

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(hub: Hub) -> Router {
    Router::new().route("/ws", get(ws::ws_handler)).with_state(hub)
}

/// Run the relay on an already-bound listener until the process exits.
pub async fn serve(listener: TcpListener) -> anyhow::Result<()> {
    info!("relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router(Hub::new())).await?;
    Ok(())
}
