//! Ripple Graph - module dependency tracking and hot-update decisions
//!
//! This crate owns the graph a development server consults when a source
//! file changes: which loaded modules depend on it, and whether the change
//! can be swapped in place or forces a full reload.
//!
//! # Architecture
//!
//! Resources live in a petgraph arena with a side table from canonical
//! identifier to index. On top of it sit:
//! - Edge maintenance with cascading prune of unreachable resources
//! - Freshness stamps that rise up to the nearest accepting boundary
//! - The boundary search producing an accept/decline decision
//!
//! The graph is synchronous and single-owner. It never reads files; loaders
//! and watchers feed it facts, listeners receive its decisions.
//!
//! # Example
//!
//! ```
//! use ripple_graph::{ChangeKind, DependencyGraph, EventLog, ResourceDecl};
//!
//! let mut graph = DependencyGraph::new();
//! let log = EventLog::new();
//! graph.subscribe(log.clone());
//!
//! graph.declare_resource(
//!     "/src/app.js",
//!     ResourceDecl::new()
//!         .kind("js_module")
//!         .dependencies(["/src/counter.js"])
//!         .accepts_dependencies(["/src/counter.js"]),
//! );
//!
//! let update = graph.record_change("/src/counter.js", ChangeKind::Modified).unwrap();
//! assert!(update.outcome.is_accepted());
//! assert_eq!(log.hot_updates().len(), 1);
//! ```

mod boundary;
mod clock;
mod event;
mod graph;
mod manifest;
mod resource;

pub use boundary::{
    CHANGED_RESOURCE_ACCEPTS, CIRCULAR_DEPENDENCY, DEPENDENT_ACCEPTS, DEPENDENT_DECLINES,
    NO_ACCEPTING_RESOURCE,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{
    ChangeKind, EventLog, GraphEvent, GraphListener, HotUpdate, Instruction, InstructionKind,
    Outcome,
};
pub use graph::{DependencyGraph, GraphConfig, GraphStats, ResourceId, PRUNED_RESOURCE_DECLINES};
pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use resource::{Resource, ResourceDecl};
