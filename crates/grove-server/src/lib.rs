//! Read-only HTTP inspection of a session

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use grove_cache::Session;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod handlers;
pub mod router;

pub use router::create_router;

/// State shared by every request handler.
pub struct ServerState {
    pub session: Arc<Session>,
}

impl ServerState {
    pub fn new(session: Arc<Session>) -> Self {
        ServerState { session }
    }
}

/// Serve the API on `addr` until `shutdown` fires.
pub async fn serve(state: Arc<ServerState>, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
