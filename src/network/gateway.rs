//! Gateway - accepts client connections and spawns their tasks.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::handlers::Registry;
use crate::network::connection::Connection;
use crate::state::Hub;
use crate::util::id::new_id;

/// The client-facing WebSocket listener.
pub struct Gateway {
    listener: TcpListener,
    hub: Arc<Hub>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind the configured listen address.
    pub async fn bind(hub: Arc<Hub>, registry: Arc<Registry>) -> anyhow::Result<Self> {
        let addr = hub.config.server.listen;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "gateway listening");
        Ok(Self {
            listener,
            hub,
            registry,
        })
    }

    /// The local address actually bound (useful when the config asked for
    /// port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is signaled. New connections are
    /// rejected after that; existing ones wind down on their own tasks.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut shutdown_rx = self.hub.lifecycle.subscribe_shutdown();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let conn_id = new_id();
                            let connection = Connection::new(
                                conn_id,
                                stream,
                                addr,
                                self.hub.clone(),
                                self.registry.clone(),
                            );
                            tokio::spawn(async move {
                                if let Err(e) = connection.run().await {
                                    warn!(error = %e, "connection task ended with error");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("gateway stopping, rejecting new connections");
                    break;
                }
            }
        }
        Ok(())
    }
}
