//! Connection - one task per client, for the connection's whole lifetime.
//!
//! The task owns both directions:
//!
//! - inbound frames are decoded and dispatched inline, one at a time, in
//!   arrival order - the per-connection serialization guarantee is
//!   structural, not locked;
//! - outbound frames arrive on the connection's bounded queue (fed by the
//!   broadcast fabric and by the connection's own handlers) and are written
//!   in queue order.
//!
//! Teardown always funnels through [`Hub::teardown_connection`], whether
//! the transport closed, the client was force-dropped, or the server is
//! shutting down.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::OutboundFrame;
use crate::handlers::{ConnState, Context, Registry};
use crate::state::Hub;

/// A client connection handler.
pub struct Connection {
    conn_id: String,
    addr: SocketAddr,
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    stream: TcpStream,
}

impl Connection {
    pub fn new(
        conn_id: String,
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<Hub>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            conn_id,
            addr,
            hub,
            registry,
            stream,
        }
    }

    /// Run the connection until the transport closes or the server drops it.
    #[instrument(skip(self), fields(conn_id = %self.conn_id, addr = %self.addr), name = "connection")]
    pub async fn run(self) -> anyhow::Result<()> {
        let ws = tokio_tungstenite::accept_async(self.stream).await?;
        let (mut sink, mut stream) = ws.split();

        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<OutboundFrame>(self.hub.config.limits.outbound_queue_depth);
        self.hub.fabric.register(&self.conn_id, outbound_tx);
        self.hub
            .presence
            .create(&self.conn_id, self.addr.ip(), Hub::now_ms());
        self.hub.stats.client_connected();
        crate::metrics::CONNECTED_CLIENTS.inc();
        info!("client connected");

        let max_frame_bytes = self.hub.config.limits.max_frame_bytes;
        let mut conn_state = ConnState::default();
        let mut shutdown_rx = self.hub.lifecycle.subscribe_shutdown();

        loop {
            tokio::select! {
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if text.len() > max_frame_bytes {
                                warn!(size = text.len(), "inbound frame too large, closing");
                                break;
                            }
                            let mut ctx = Context {
                                conn_id: &self.conn_id,
                                remote_ip: self.addr.ip(),
                                hub: &self.hub,
                                state: &mut conn_state,
                            };
                            self.registry.dispatch(&mut ctx, &text).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if sink.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("client closed connection");
                            break;
                        }
                        Some(Ok(_)) => {
                            // Binary/pong frames are not part of the protocol.
                        }
                        Some(Err(e)) => {
                            debug!(error = %e, "read error");
                            break;
                        }
                    }
                }
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(frame) => {
                            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                                break;
                            }
                        }
                        // Sender side dropped: the fabric unregistered us
                        // (forced disconnect already tore state down).
                        None => break,
                    }
                }
                _ = shutdown_rx.recv() => {
                    // The orchestrator already queued `server:shutdown` for
                    // everyone; flush whatever is pending and close.
                    while let Ok(frame) = outbound_rx.try_recv() {
                        if sink.send(Message::Text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }

        self.hub.teardown_connection(&self.conn_id, None);
        Ok(())
    }
}
