//! WebSocket server front-end.

pub mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::gateway::Gateway;

/// Accept loop: one spawned task per client connection.
pub struct WsServer {
    gateway: Arc<Gateway>,
}

impl WsServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    /// Serve connections on an already-bound listener. Runs until the task
    /// is cancelled.
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        info!(addr = %listener.local_addr()?, "WebSocket server listening");
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let gateway = Arc::clone(&self.gateway);
                    tokio::spawn(async move {
                        if let Err(e) = ws::handle_connection(gateway, stream, peer).await {
                            debug!(%peer, error = %e, "Connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                }
            }
        }
    }
}
