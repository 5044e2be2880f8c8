//! Decisions and notifications produced by the graph.
//!
//! Every change ends in exactly one [`HotUpdate`]: either a list of
//! boundaries to swap, or a decline that forces a full reload. Pruned
//! resources are reported separately as they are removed.

use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Kind of filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
    Removed,
    Added,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Added => "added",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "modified" | "change" | "changed" => Ok(Self::Modified),
            "removed" | "unlink" | "deleted" => Ok(Self::Removed),
            "added" | "add" | "created" => Ok(Self::Added),
            other => Err(format!("unknown change kind: {}", other)),
        }
    }
}

/// What a client must do with a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    /// Re-fetch and swap the boundary in place.
    Update,
    /// Drop the boundary; it is no longer reachable.
    Prune,
}

/// A single step of an accepted hot update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: InstructionKind,
    /// The resource that has to react.
    pub boundary: String,
    /// The resource whose change the boundary absorbs.
    pub accepted_by: String,
}

impl Instruction {
    pub fn update(boundary: impl Into<String>, accepted_by: impl Into<String>) -> Self {
        Self {
            kind: InstructionKind::Update,
            boundary: boundary.into(),
            accepted_by: accepted_by.into(),
        }
    }

    pub fn prune(boundary: impl Into<String>, accepted_by: impl Into<String>) -> Self {
        Self {
            kind: InstructionKind::Prune,
            boundary: boundary.into(),
            accepted_by: accepted_by.into(),
        }
    }
}

/// Result of a boundary search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Accepted {
        reason: String,
        instructions: Vec<Instruction>,
    },
    Declined {
        reason: String,
        /// The resource that vetoed. `None` when nothing accepted the change.
        declined_by: Option<String>,
    },
}

impl Outcome {
    pub fn accepted(reason: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self::Accepted {
            reason: reason.into(),
            instructions,
        }
    }

    pub fn declined(reason: impl Into<String>, declined_by: Option<String>) -> Self {
        Self::Declined {
            reason: reason.into(),
            declined_by,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Accepted { reason, .. } | Self::Declined { reason, .. } => reason,
        }
    }

    /// Instructions of an accepted outcome, empty when declined.
    pub fn instructions(&self) -> &[Instruction] {
        match self {
            Self::Accepted { instructions, .. } => instructions,
            Self::Declined { .. } => &[],
        }
    }

    pub fn declined_by(&self) -> Option<&str> {
        match self {
            Self::Declined { declined_by, .. } => declined_by.as_deref(),
            Self::Accepted { .. } => None,
        }
    }
}

/// A decision about one change, ready to be relayed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotUpdate {
    /// Human-readable description of what triggered the decision.
    pub cause: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl HotUpdate {
    pub fn new(cause: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            cause: cause.into(),
            outcome,
        }
    }
}

/// Notification emitted by the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum GraphEvent {
    HotUpdate(HotUpdate),
    Pruned(Resource),
}

/// Receives graph events synchronously, inside the triggering call.
///
/// Listeners only see the event, never the graph, so they cannot mutate it
/// while a propagation is in flight. Queue follow-up work elsewhere.
pub trait GraphListener: Send + Sync {
    fn on_event(&mut self, event: &GraphEvent);
}

impl<F> GraphListener for F
where
    F: FnMut(&GraphEvent) + Send + Sync,
{
    fn on_event(&mut self, event: &GraphEvent) {
        self(event)
    }
}

/// A cloneable listener that records every event it sees.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<GraphEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<GraphEvent> {
        self.lock().clone()
    }

    /// Recorded hot updates, in emission order.
    pub fn hot_updates(&self) -> Vec<HotUpdate> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::HotUpdate(update) => Some(update.clone()),
                GraphEvent::Pruned(_) => None,
            })
            .collect()
    }

    /// Ids of pruned resources, in emission order.
    pub fn pruned(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::Pruned(resource) => Some(resource.id.clone()),
                GraphEvent::HotUpdate(_) => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<GraphEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GraphListener for EventLog {
    fn on_event(&mut self, event: &GraphEvent) {
        self.lock().push(event.clone());
    }
}
