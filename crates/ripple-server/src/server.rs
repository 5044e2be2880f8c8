//! WebSocket server implementation.
//!
//! Each client gets the current snapshot on connect, then a stream of
//! broadcast graph events interleaved with answers to its own JSON-RPC
//! requests.

use crate::handlers::{
    handle_find_dependent, handle_get, handle_info, handle_propagate, handle_snapshot,
    handle_stamp,
};
use crate::protocol::{FindDependentParams, Request, ResourceParams, Response};
use crate::relay::{run_relay, BroadcastListener, BroadcastMessage};
use crate::SharedGraph;
use futures_util::{SinkExt, StreamExt};
use ripple_graph::DependencyGraph;
use ripple_watcher::{run_watcher, WatchConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 7450)),
        }
    }
}

/// The hot-update WebSocket server.
pub struct HotServer {
    config: ServerConfig,
    graph: SharedGraph,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

impl HotServer {
    /// Creates a server owning `graph` and subscribes it to the broadcast.
    pub fn new(mut graph: DependencyGraph, config: ServerConfig) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        graph.subscribe(BroadcastListener::new(broadcast_tx.clone()));

        Self {
            config,
            graph: Arc::new(RwLock::new(graph)),
            broadcast_tx,
        }
    }

    /// Returns a handle to the shared graph for updates.
    pub fn graph(&self) -> SharedGraph {
        self.graph.clone()
    }

    /// Returns a broadcast receiver for server messages.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.broadcast_tx.subscribe()
    }

    /// Watches `watch` for changes and serves clients until either side fails.
    pub async fn run_with_watcher(
        &self,
        watch: WatchConfig,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (change_tx, change_rx) = mpsc::channel(256);

        tokio::spawn(async move {
            if let Err(e) = run_watcher(watch, change_tx).await {
                error!("File watcher error: {}", e);
            }
        });
        tokio::spawn(run_relay(change_rx, self.graph.clone()));

        self.run().await
    }

    /// Runs the server, accepting connections forever.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.addr).await?;
        info!("Ripple server listening on ws://{}", self.config.addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let graph = self.graph.clone();
                    let broadcast_rx = self.broadcast_tx.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, addr, graph, broadcast_rx).await {
                            warn!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handles a single WebSocket client connection.
async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    graph: SharedGraph,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();
    let client = Uuid::new_v4();

    info!("Client {} connected from {}", client, addr);

    let snapshot = {
        let g = graph.read().await;
        BroadcastMessage::snapshot(&g)
    };
    write
        .send(Message::Text(serde_json::to_string(&snapshot)?))
        .await?;
    debug!("Sent initial snapshot to {}", client);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = process_message(&text, graph.clone()).await;
                        write.send(Message::Text(serde_json::to_string(&response)?)).await?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("Client {} disconnected", client);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Message error from {}: {}", client, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }

            msg = broadcast_rx.recv() => {
                match msg {
                    Ok(broadcast) => {
                        let json = serde_json::to_string(&broadcast)?;
                        if write.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged by {} messages", client, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Connection closed: {}", client);
    Ok(())
}

/// Processes a JSON-RPC message and returns a response.
pub(crate) async fn process_message(text: &str, graph: SharedGraph) -> Response {
    let request: Request = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => return Response::parse_error(),
    };

    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("Processing method: {}", method);

    match method {
        "graph.info" => handle_info(graph, id).await,

        "graph.snapshot" => handle_snapshot(graph, id).await,

        "resource.get" => match serde_json::from_value::<ResourceParams>(request.params) {
            Ok(params) => handle_get(graph, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "resource.stamp" => match serde_json::from_value::<ResourceParams>(request.params) {
            Ok(params) => handle_stamp(graph, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "propagate" => match serde_json::from_value::<ResourceParams>(request.params) {
            Ok(params) => handle_propagate(graph, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        "dependent.find" => match serde_json::from_value::<FindDependentParams>(request.params) {
            Ok(params) => handle_find_dependent(graph, id, params).await,
            Err(e) => Response::invalid_params(id, e.to_string()),
        },

        _ => Response::method_not_found(id, method),
    }
}
