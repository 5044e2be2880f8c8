//! Bridges between the graph and connected clients.
//!
//! File changes flow in through [`run_relay`], which records them on the
//! shared graph. The graph answers synchronously through its listeners; a
//! [`BroadcastListener`] turns each answer into a [`BroadcastMessage`] that
//! every client connection forwards.

use crate::SharedGraph;
use chrono::Utc;
use ripple_graph::{DependencyGraph, GraphEvent, GraphListener, HotUpdate, Resource};
use ripple_watcher::FileChange;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Server messages broadcast to all connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BroadcastMessage {
    /// A hot-update decision for a recorded change.
    HotUpdate(HotUpdatePayload),
    /// A resource was dropped from the graph.
    Pruned(PrunedPayload),
    /// The whole dependency map.
    Snapshot(SnapshotPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct HotUpdatePayload {
    #[serde(flatten)]
    pub update: HotUpdate,
    /// RFC 3339 time the decision was relayed.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrunedPayload {
    pub id: String,
    pub kind: String,
    /// Stamp given to the resource just before it was removed.
    pub stamp: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotPayload {
    pub resource_count: usize,
    pub edge_count: usize,
    /// Identifier to dependency list.
    pub resources: BTreeMap<String, Vec<String>>,
    pub timestamp: String,
}

impl BroadcastMessage {
    /// Wraps a graph event for the wire.
    pub fn from_event(event: &GraphEvent) -> Self {
        let timestamp = Utc::now().to_rfc3339();
        match event {
            GraphEvent::HotUpdate(update) => Self::HotUpdate(HotUpdatePayload {
                update: update.clone(),
                timestamp,
            }),
            GraphEvent::Pruned(resource) => Self::Pruned(PrunedPayload::new(resource, timestamp)),
        }
    }

    /// Captures the current graph.
    pub fn snapshot(graph: &DependencyGraph) -> Self {
        Self::Snapshot(SnapshotPayload {
            resource_count: graph.len(),
            edge_count: graph.edge_count(),
            resources: graph.snapshot(),
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}

impl PrunedPayload {
    fn new(resource: &Resource, timestamp: String) -> Self {
        Self {
            id: resource.id.clone(),
            kind: resource.kind.clone(),
            stamp: resource.stamp,
            timestamp,
        }
    }
}

/// Forwards graph events to a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    tx: broadcast::Sender<BroadcastMessage>,
}

impl BroadcastListener {
    pub fn new(tx: broadcast::Sender<BroadcastMessage>) -> Self {
        Self { tx }
    }
}

impl GraphListener for BroadcastListener {
    fn on_event(&mut self, event: &GraphEvent) {
        // No receivers just means no client is connected.
        if self.tx.send(BroadcastMessage::from_event(event)).is_err() {
            debug!("No clients to receive graph event");
        }
    }
}

/// Records every incoming file change on the graph until the channel closes.
///
/// Events raised by `record_change` reach clients through whatever listeners
/// the graph carries.
pub async fn run_relay(mut rx: mpsc::Receiver<FileChange>, graph: SharedGraph) {
    info!("Change relay started");

    while let Some(change) = rx.recv().await {
        let mut g = graph.write().await;
        match g.record_change(&change.id, change.kind) {
            Some(update) => debug!("{}: {}", update.cause, update.outcome.reason()),
            None => debug!("Ignoring change to untracked {}", change.id),
        }
    }

    info!("Change relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_graph::{ChangeKind, ResourceDecl};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    fn sample(tx: broadcast::Sender<BroadcastMessage>) -> SharedGraph {
        let mut graph = DependencyGraph::new();
        graph.declare_resource(
            "/src/main.js",
            ResourceDecl::new()
                .dependencies(["/src/counter.js"])
                .accepts_dependencies(["/src/counter.js"]),
        );
        graph.subscribe(BroadcastListener::new(tx));
        Arc::new(RwLock::new(graph))
    }

    fn change(id: &str, kind: ChangeKind) -> FileChange {
        FileChange {
            id: id.to_string(),
            path: PathBuf::from(format!(".{}", id)),
            kind,
        }
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut graph = DependencyGraph::new();
        graph.declare_resource("/a.js", ResourceDecl::new().dependencies(["/b.js"]));

        let json = serde_json::to_value(BroadcastMessage::snapshot(&graph)).unwrap();
        assert_eq!(json["type"], "Snapshot");
        assert_eq!(json["payload"]["resource_count"], 2);
        assert_eq!(json["payload"]["resources"]["/a.js"][0], "/b.js");
    }

    #[test]
    fn test_pruned_event_payload() {
        let mut resource = Resource::new("/old.js");
        resource.stamp = 9;

        let message = BroadcastMessage::from_event(&GraphEvent::Pruned(resource));
        let json = serde_json::to_value(message).unwrap();
        assert_eq!(json["type"], "Pruned");
        assert_eq!(json["payload"]["id"], "/old.js");
        assert_eq!(json["payload"]["stamp"], 9);
    }

    #[tokio::test]
    async fn test_relay_broadcasts_hot_updates() {
        let (tx, mut rx) = broadcast::channel(16);
        let graph = sample(tx);
        let (change_tx, change_rx) = mpsc::channel(4);

        change_tx
            .send(change("/src/counter.js", ChangeKind::Modified))
            .await
            .unwrap();
        change_tx
            .send(change("/untracked.js", ChangeKind::Added))
            .await
            .unwrap();
        drop(change_tx);

        run_relay(change_rx, graph.clone()).await;

        let message = rx.recv().await.unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "HotUpdate");
        assert_eq!(json["payload"]["status"], "accepted");
        assert_eq!(json["payload"]["cause"], "/src/counter.js was modified");
        assert!(rx.try_recv().is_err());

        assert!(graph.read().await.get_stamp_for("/src/counter.js").unwrap() > 0);
    }
}
