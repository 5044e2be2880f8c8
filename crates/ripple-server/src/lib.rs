//! Ripple Server - hot-update notifications over WebSocket
//!
//! This crate puts a [`DependencyGraph`] behind a WebSocket endpoint so a
//! browser runtime or an editor integration can follow hot updates live.
//!
//! The server supports:
//! - Multiple concurrent connections
//! - JSON-RPC 2.0 queries against the graph
//! - Broadcast of every hot-update decision and pruned resource
//! - File watching feeding changes into the graph

use ripple_graph::DependencyGraph;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared graph state across connections.
pub type SharedGraph = Arc<RwLock<DependencyGraph>>;

mod handlers;
mod protocol;
mod relay;
mod server;

pub use protocol::{FindDependentParams, Request, ResourceParams, Response, RpcError};
pub use relay::{
    run_relay, BroadcastListener, BroadcastMessage, HotUpdatePayload, PrunedPayload,
    SnapshotPayload,
};
pub use server::{HotServer, ServerConfig};
