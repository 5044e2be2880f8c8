//! Core graph data structure.
//!
//! The DependencyGraph keeps resources in a petgraph arena and adds a side
//! table from canonical identifier to arena index. An edge `a -> b` means
//! `a` depends on `b`: dependencies are the outgoing neighbors, dependents
//! the incoming ones. Both directions are read off the same edge, so the
//! relation stays symmetric no matter how edges are added or removed.

use crate::clock::{Clock, SystemClock};
use crate::event::{ChangeKind, GraphEvent, GraphListener, HotUpdate, Instruction, Outcome};
use crate::resource::{Resource, ResourceDecl};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Stable handle of a resource inside the arena.
pub type ResourceId = NodeIndex;

/// Reason used when a pruned resource vetoes the update.
pub const PRUNED_RESOURCE_DECLINES: &str = "a pruned resource declines hot reload";

/// Graph-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Identifier prefix of the managed domain. `None` manages every id.
    #[serde(default)]
    pub scope: Option<String>,
}

impl GraphConfig {
    /// Returns true if `id` belongs to the managed domain.
    pub fn manages(&self, id: &str) -> bool {
        self.scope
            .as_deref()
            .map_or(true, |scope| id.starts_with(scope))
    }
}

/// The module dependency graph.
///
/// Loaders feed it with [`declare_resource`](Self::declare_resource),
/// watchers with [`record_change`](Self::record_change). Decisions are
/// delivered to subscribed listeners as they are made.
pub struct DependencyGraph {
    /// Resource arena. Indexes stay valid across removals.
    pub(crate) graph: StableDiGraph<Resource, ()>,

    /// Maps canonical identifiers to arena indexes.
    id_index: HashMap<String, ResourceId>,

    config: GraphConfig,

    clock: Box<dyn Clock>,

    /// Last stamp handed out; stamps never go backwards.
    last_stamp: u64,

    listeners: Vec<Box<dyn GraphListener>>,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("resources", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("config", &self.config)
            .field("last_stamp", &self.last_stamp)
            .field("listeners", &format!("<{} listeners>", self.listeners.len()))
            .finish()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Creates an empty graph managing every identifier.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Creates an empty graph with the given settings.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            graph: StableDiGraph::new(),
            id_index: HashMap::new(),
            config,
            clock: Box::new(SystemClock),
            last_stamp: 0,
            listeners: Vec::new(),
        }
    }

    /// Replaces the time source used for stamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Registers a listener for hot updates and prune notifications.
    pub fn subscribe(&mut self, listener: impl GraphListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────

    /// Upserts a resource and, if given, replaces its dependency list.
    ///
    /// Unset fields keep their current value. Dependencies dropped from the
    /// list are detached and pruned when nothing else depends on them.
    ///
    /// # Panics
    ///
    /// Panics on an empty identifier; that is a bug in the calling loader.
    pub fn declare_resource(&mut self, id: &str, decl: ResourceDecl) {
        assert!(!id.is_empty(), "resource identifier must not be empty");

        let index = self.ensure(id);
        self.graph[index].merge(&decl);

        let Some(dependency_ids) = decl.dependencies else {
            return;
        };

        let previous = self.ordered_neighbors(index, Direction::Outgoing);
        let mut wanted = HashSet::with_capacity(dependency_ids.len());

        for dependency_id in &dependency_ids {
            assert!(
                !dependency_id.is_empty(),
                "dependency identifier of {} must not be empty",
                id
            );
            let dependency = self.ensure(dependency_id);
            if self.graph.find_edge(index, dependency).is_none() {
                self.graph.add_edge(index, dependency, ());
                debug!("{} now depends on {}", id, dependency_id);
            }
            wanted.insert(dependency);
        }

        let removed: Vec<ResourceId> = previous
            .into_iter()
            .filter(|dependency| !wanted.contains(dependency))
            .collect();

        if !removed.is_empty() {
            self.prune_dependencies(index, &removed);
        }
    }

    /// Records a filesystem change and emits the resulting hot update.
    ///
    /// Unknown identifiers are ignored: the change is irrelevant to any
    /// loaded module. The emitted update is also returned.
    pub fn record_change(&mut self, id: &str, kind: ChangeKind) -> Option<HotUpdate> {
        let Some(index) = self.index_of(id) else {
            debug!("Ignoring change to untracked {}", id);
            return None;
        };

        let stamp = self.next_stamp();
        self.propagate_stamp(index, stamp);

        let outcome = self.propagate_update_from(index);
        let update = HotUpdate::new(format!("{} was {}", id, kind), outcome);
        self.log_decision(&update);
        self.emit(GraphEvent::HotUpdate(update.clone()));

        Some(update)
    }

    /// Detaches `removed` from `root` and prunes whatever became unreachable.
    fn prune_dependencies(&mut self, root: ResourceId, removed: &[ResourceId]) {
        let pruned = self.detach(root, removed);

        if pruned.is_empty() {
            return;
        }

        let stamp = self.next_stamp();
        let mut resources = Vec::with_capacity(pruned.len());
        for index in pruned {
            // Detached on both sides already, so removal drops no edges.
            if let Some(mut resource) = self.graph.remove_node(index) {
                self.id_index.remove(&resource.id);
                resource.stamp = stamp;
                resources.push(resource);
            }
        }

        for resource in &resources {
            debug!("Pruned {}", resource.id);
            self.emit(GraphEvent::Pruned(resource.clone()));
        }

        let root_id = self.graph[root].id.clone();
        let cause = format!("{} dropped {} dependencies", root_id, resources.len());

        let outcome = match self.propagate_update_from(root) {
            declined @ Outcome::Declined { .. } => declined,
            Outcome::Accepted { reason, .. } => {
                match resources.iter().find(|resource| resource.declines_reload) {
                    Some(decliner) => {
                        Outcome::declined(PRUNED_RESOURCE_DECLINES, Some(decliner.id.clone()))
                    }
                    None => Outcome::accepted(
                        reason,
                        resources
                            .iter()
                            .map(|resource| Instruction::prune(&resource.id, &root_id))
                            .collect(),
                    ),
                }
            }
        };

        let update = HotUpdate::new(cause, outcome);
        self.log_decision(&update);
        self.emit(GraphEvent::HotUpdate(update));
    }

    /// Removes the edges `root -> removed` and cascades through every
    /// dependency that lost its last dependent. The root is never pruned.
    ///
    /// Returns the pruned resources in discovery order.
    fn detach(&mut self, root: ResourceId, removed: &[ResourceId]) -> Vec<ResourceId> {
        let mut pruned = Vec::new();
        let mut seen = HashSet::new();
        let mut work: Vec<(ResourceId, ResourceId)> =
            removed.iter().rev().map(|&dependency| (root, dependency)).collect();

        while let Some((dependent, dependency)) = work.pop() {
            if let Some(edge) = self.graph.find_edge(dependent, dependency) {
                self.graph.remove_edge(edge);
            }

            if dependency == root || seen.contains(&dependency) {
                continue;
            }

            let still_needed = self
                .graph
                .neighbors_directed(dependency, Direction::Incoming)
                .next()
                .is_some();
            if still_needed {
                continue;
            }

            seen.insert(dependency);
            pruned.push(dependency);
            work.extend(
                self.ordered_neighbors(dependency, Direction::Outgoing)
                    .into_iter()
                    .rev()
                    .map(|next| (dependency, next)),
            );
        }

        pruned
    }

    /// Stamps `start` and every dependent up to the nearest boundary that
    /// accepts the changed dependency. Each resource is visited once.
    fn propagate_stamp(&mut self, start: ResourceId, stamp: u64) {
        let mut visited = HashSet::new();
        let mut work = vec![start];

        while let Some(index) = work.pop() {
            if !visited.insert(index) {
                continue;
            }

            self.graph[index].stamp = stamp;

            for dependent in self.ordered_neighbors(index, Direction::Incoming) {
                if !self.graph[dependent].accepts_dependency(&self.graph[index].id) {
                    work.push(dependent);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Gets a resource by identifier.
    pub fn get(&self, id: &str) -> Option<&Resource> {
        let index = self.id_index.get(id)?;
        self.graph.node_weight(*index)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_index.contains_key(id)
    }

    /// Returns the stamp of a resource, or `None` if it is untracked or
    /// outside the managed scope.
    pub fn get_stamp_for(&self, id: &str) -> Option<u64> {
        if !self.config.manages(id) {
            return None;
        }
        self.get(id).map(|resource| resource.stamp)
    }

    /// Identifiers `id` depends on, in the order the edges were first
    /// added. Re-declaring a list in another order keeps existing edges.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbor_ids(id, Direction::Outgoing)
    }

    /// Identifiers depending on `id`, in the order the edges were added.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbor_ids(id, Direction::Incoming)
    }

    /// Depth-first search over dependents for the first resource matching
    /// `predicate`. The starting resource itself is never returned.
    pub fn find_dependent<P>(&self, id: &str, mut predicate: P) -> Option<&Resource>
    where
        P: FnMut(&Resource) -> bool,
    {
        let start = self.index_of(id)?;
        let mut visited = HashSet::new();
        visited.insert(start);

        let mut stack: Vec<ResourceId> = self
            .ordered_neighbors(start, Direction::Incoming)
            .into_iter()
            .rev()
            .collect();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            let resource = &self.graph[current];
            if predicate(resource) {
                return Some(resource);
            }

            stack.extend(
                self.ordered_neighbors(current, Direction::Incoming)
                    .into_iter()
                    .rev(),
            );
        }

        None
    }

    /// Dependency lists keyed by identifier, sorted by identifier.
    /// Resources without dependencies are omitted.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.graph
            .node_indices()
            .filter_map(|index| {
                let dependencies: Vec<String> = self
                    .ordered_neighbors(index, Direction::Outgoing)
                    .into_iter()
                    .map(|dependency| self.graph[dependency].id.clone())
                    .collect();
                if dependencies.is_empty() {
                    None
                } else {
                    Some((self.graph[index].id.clone(), dependencies))
                }
            })
            .collect()
    }

    /// Iterates over all resources.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.graph
            .node_indices()
            .filter_map(move |index| self.graph.node_weight(index))
    }

    /// Returns the number of resources.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn index_of(&self, id: &str) -> Option<ResourceId> {
        self.id_index.get(id).copied()
    }

    /// Neighbors in edge insertion order.
    pub(crate) fn ordered_neighbors(
        &self,
        index: ResourceId,
        direction: Direction,
    ) -> Vec<ResourceId> {
        let mut neighbors: Vec<ResourceId> =
            self.graph.neighbors_directed(index, direction).collect();
        // petgraph yields the most recently added edge first.
        neighbors.reverse();
        neighbors
    }

    fn neighbor_ids(&self, id: &str, direction: Direction) -> Vec<&str> {
        match self.index_of(id) {
            Some(index) => self
                .ordered_neighbors(index, direction)
                .into_iter()
                .map(|neighbor| self.graph[neighbor].id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns the index for `id`, creating a default resource if needed.
    fn ensure(&mut self, id: &str) -> ResourceId {
        if let Some(index) = self.index_of(id) {
            return index;
        }
        let index = self.graph.add_node(Resource::new(id));
        self.id_index.insert(id.to_string(), index);
        index
    }

    fn next_stamp(&mut self) -> u64 {
        let now = self.clock.now();
        self.last_stamp = now.max(self.last_stamp.saturating_add(1));
        self.last_stamp
    }

    fn emit(&mut self, event: GraphEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }

    fn log_decision(&self, update: &HotUpdate) {
        match &update.outcome {
            Outcome::Accepted { instructions, .. } => info!(
                "Hot update accepted ({}): {} instruction(s)",
                update.cause,
                instructions.len()
            ),
            Outcome::Declined {
                reason,
                declined_by,
            } => warn!(
                "Hot update declined ({}): {}{}",
                update.cause,
                reason,
                declined_by
                    .as_deref()
                    .map(|by| format!(" [{}]", by))
                    .unwrap_or_default()
            ),
        }
    }
}

/// Graph statistics for the info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub resource_count: usize,
    pub edge_count: usize,
    pub self_accepting: usize,
    pub declining: usize,
}

impl DependencyGraph {
    /// Returns graph statistics.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            resource_count: self.len(),
            edge_count: self.edge_count(),
            self_accepting: self.resources().filter(|r| r.accepts_self).count(),
            declining: self.resources().filter(|r| r.declines_reload).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{DEPENDENT_DECLINES, NO_ACCEPTING_RESOURCE};
    use crate::clock::ManualClock;
    use crate::event::{EventLog, InstructionKind};

    fn graph_with_log() -> (DependencyGraph, EventLog, ManualClock) {
        let clock = ManualClock::new(1_000);
        let log = EventLog::new();
        let mut graph = DependencyGraph::new().with_clock(clock.clone());
        graph.subscribe(log.clone());
        (graph, log, clock)
    }

    fn deps(graph: &mut DependencyGraph, id: &str, dependencies: &[&str]) {
        graph.declare_resource(id, ResourceDecl::new().dependencies(dependencies.iter().copied()));
    }

    fn assert_symmetric(graph: &DependencyGraph) {
        for resource in graph.resources() {
            for dependency in graph.dependencies_of(&resource.id) {
                assert!(
                    graph.dependents_of(dependency).contains(&resource.id.as_str()),
                    "{} -> {} has no back edge",
                    resource.id,
                    dependency
                );
            }
            for dependent in graph.dependents_of(&resource.id) {
                assert!(graph.dependencies_of(dependent).contains(&resource.id.as_str()));
            }
        }
    }

    #[test]
    fn test_declare_creates_dependencies_implicitly() {
        let (mut graph, log, _) = graph_with_log();
        graph.declare_resource(
            "/index.html",
            ResourceDecl::new().kind("html").dependencies(["/main.js"]),
        );

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.get("/index.html").unwrap().kind, "html");
        assert_eq!(graph.get("/main.js").unwrap().kind, "");
        assert_eq!(graph.dependents_of("/main.js"), vec!["/index.html"]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_symmetry_across_redeclarations() {
        let (mut graph, _, _) = graph_with_log();
        deps(&mut graph, "/a.js", &["/b.js", "/c.js"]);
        deps(&mut graph, "/d.js", &["/b.js", "/a.js"]);
        deps(&mut graph, "/b.js", &["/c.js"]);
        assert_symmetric(&graph);

        deps(&mut graph, "/a.js", &["/c.js"]);
        deps(&mut graph, "/d.js", &["/c.js", "/a.js"]);
        assert_symmetric(&graph);

        assert!(!graph.contains("/b.js"));
        assert_eq!(graph.dependents_of("/c.js"), vec!["/a.js", "/d.js"]);
    }

    #[test]
    fn test_declare_merges_scalar_fields() {
        let (mut graph, _, _) = graph_with_log();
        graph.declare_resource(
            "/a.js",
            ResourceDecl::new()
                .kind("js_module")
                .accepts_self(true)
                .dependencies(["/b.js"]),
        );
        graph.declare_resource("/a.js", ResourceDecl::new().declines_reload(true));

        let a = graph.get("/a.js").unwrap();
        assert_eq!(a.kind, "js_module");
        assert!(a.accepts_self);
        assert!(a.declines_reload);
        assert_eq!(graph.dependencies_of("/a.js"), vec!["/b.js"]);
    }

    #[test]
    fn test_declare_is_idempotent() {
        let (mut graph, log, _) = graph_with_log();
        let decl = ResourceDecl::new()
            .kind("js_module")
            .dependencies(["/b.js", "/c.js"])
            .accepts_dependencies(["/b.js"]);

        graph.declare_resource("/a.js", decl.clone());
        let before = graph.snapshot();
        graph.declare_resource("/a.js", decl);

        assert_eq!(graph.snapshot(), before);
        assert_eq!(graph.edge_count(), 2);
        assert!(log.is_empty());
    }

    #[test]
    fn test_duplicate_dependencies_create_one_edge() {
        let (mut graph, _, _) = graph_with_log();
        deps(&mut graph, "/a.js", &["/b.js", "/b.js"]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_cascading_prune_scenario() {
        let (mut graph, log, _) = graph_with_log();
        deps(&mut graph, "/a.js", &[]);
        deps(&mut graph, "/b.js", &["/a.js"]);
        deps(&mut graph, "/c.js", &["/b.js"]);

        deps(&mut graph, "/b.js", &[]);

        assert_eq!(log.pruned(), vec!["/a.js".to_string()]);
        assert!(!graph.contains("/a.js"));

        let updates = log.hot_updates();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].outcome.is_accepted());
        assert_eq!(updates[0].outcome.reason(), NO_ACCEPTING_RESOURCE);
        assert_eq!(updates[0].outcome.declined_by(), None);
    }

    #[test]
    fn test_prune_cascades_in_discovery_order() {
        let (mut graph, log, clock) = graph_with_log();
        deps(&mut graph, "/b.js", &["/a.js"]);
        deps(&mut graph, "/a.js", &["/x.js", "/shared.js"]);
        deps(&mut graph, "/x.js", &["/y.js"]);
        deps(&mut graph, "/other.js", &["/shared.js"]);

        clock.set(5_000);
        deps(&mut graph, "/b.js", &[]);

        assert_eq!(log.pruned(), vec!["/a.js", "/x.js", "/y.js"]);
        assert!(graph.contains("/shared.js"));
        assert_eq!(graph.dependents_of("/shared.js"), vec!["/other.js"]);
        assert_symmetric(&graph);

        let stamps: Vec<u64> = log
            .events()
            .iter()
            .filter_map(|event| match event {
                GraphEvent::Pruned(resource) => Some(resource.stamp),
                GraphEvent::HotUpdate(_) => None,
            })
            .collect();
        assert_eq!(stamps, vec![5_000, 5_000, 5_000]);
    }

    #[test]
    fn test_prune_accepted_emits_prune_instructions() {
        let (mut graph, log, _) = graph_with_log();
        deps(&mut graph, "/b.js", &["/a.js"]);
        graph.declare_resource(
            "/c.js",
            ResourceDecl::new()
                .dependencies(["/b.js"])
                .accepts_dependencies(["/b.js"]),
        );

        deps(&mut graph, "/b.js", &[]);

        let updates = log.hot_updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].outcome.is_accepted());
        assert_eq!(
            updates[0].outcome.reason(),
            "1 dependent resource(s) accept hot reload"
        );
        assert_eq!(
            updates[0].outcome.instructions(),
            &[Instruction::prune("/a.js", "/b.js")]
        );
        assert_eq!(
            updates[0].outcome.instructions()[0].kind,
            InstructionKind::Prune
        );
    }

    #[test]
    fn test_pruned_resource_declining_vetoes() {
        let (mut graph, log, _) = graph_with_log();
        graph.declare_resource("/a.js", ResourceDecl::new().declines_reload(true));
        deps(&mut graph, "/b.js", &["/a.js"]);
        graph.declare_resource("/b.js", ResourceDecl::new().accepts_self(true));

        deps(&mut graph, "/b.js", &[]);

        let updates = log.hot_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].outcome.reason(), PRUNED_RESOURCE_DECLINES);
        assert_eq!(updates[0].outcome.declined_by(), Some("/a.js"));
    }

    #[test]
    fn test_dependent_veto_outranks_declining_pruned_resource() {
        // p -> r -> x, p and x both decline
        let (mut graph, log, _) = graph_with_log();
        deps(&mut graph, "/r.js", &["/x.js"]);
        graph.declare_resource("/x.js", ResourceDecl::new().declines_reload(true));
        graph.declare_resource(
            "/p.js",
            ResourceDecl::new().dependencies(["/r.js"]).declines_reload(true),
        );

        deps(&mut graph, "/r.js", &[]);

        assert_eq!(log.pruned(), vec!["/x.js"]);
        let updates = log.hot_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].outcome,
            Outcome::declined(DEPENDENT_DECLINES, Some("/p.js".into()))
        );
    }

    #[test]
    fn test_no_event_when_nothing_pruned() {
        let (mut graph, log, _) = graph_with_log();
        deps(&mut graph, "/a.js", &["/shared.js"]);
        deps(&mut graph, "/b.js", &["/shared.js"]);

        deps(&mut graph, "/a.js", &[]);

        assert!(log.is_empty());
        assert_eq!(graph.dependents_of("/shared.js"), vec!["/b.js"]);
    }

    #[test]
    fn test_root_is_never_pruned_through_cycle() {
        let (mut graph, log, _) = graph_with_log();
        deps(&mut graph, "/root.js", &["/u.js"]);
        deps(&mut graph, "/u.js", &["/root.js"]);

        deps(&mut graph, "/root.js", &[]);

        assert_eq!(log.pruned(), vec!["/u.js"]);
        assert!(graph.contains("/root.js"));
        assert!(graph.dependents_of("/root.js").is_empty());
    }

    #[test]
    fn test_record_change_unknown_id_is_noop() {
        let (mut graph, log, _) = graph_with_log();
        deps(&mut graph, "/a.js", &["/b.js"]);

        assert!(graph
            .record_change("never-declared", ChangeKind::Modified)
            .is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_change_emits_one_update() {
        let (mut graph, log, _) = graph_with_log();
        graph.declare_resource("/a.js", ResourceDecl::new().accepts_self(true));

        let update = graph.record_change("/a.js", ChangeKind::Modified).unwrap();

        assert_eq!(update.cause, "/a.js was modified");
        assert_eq!(log.hot_updates(), vec![update]);
    }

    #[test]
    fn test_stamp_stops_at_accepting_boundary() {
        let (mut graph, _, clock) = graph_with_log();
        deps(&mut graph, "/c.js", &["/b.js"]);
        graph.declare_resource(
            "/b.js",
            ResourceDecl::new()
                .dependencies(["/a.js"])
                .accepts_dependencies(["/a.js"]),
        );
        deps(&mut graph, "/d.js", &["/a.js"]);

        clock.set(2_000);
        graph.record_change("/a.js", ChangeKind::Modified);

        assert_eq!(graph.get_stamp_for("/a.js"), Some(2_000));
        assert_eq!(graph.get_stamp_for("/d.js"), Some(2_000));
        assert_eq!(graph.get_stamp_for("/b.js"), Some(0));
        assert_eq!(graph.get_stamp_for("/c.js"), Some(0));
    }

    #[test]
    fn test_stamp_propagation_terminates_on_cycle() {
        let (mut graph, _, clock) = graph_with_log();
        deps(&mut graph, "/a.js", &["/b.js"]);
        deps(&mut graph, "/b.js", &["/a.js"]);

        clock.set(3_000);
        graph.record_change("/a.js", ChangeKind::Modified);

        assert_eq!(graph.get_stamp_for("/a.js"), Some(3_000));
        assert_eq!(graph.get_stamp_for("/b.js"), Some(3_000));
    }

    #[test]
    fn test_stamps_are_monotonic() {
        let (mut graph, _, _) = graph_with_log();
        deps(&mut graph, "/a.js", &[]);

        graph.record_change("/a.js", ChangeKind::Modified);
        let first = graph.get_stamp_for("/a.js").unwrap();
        graph.record_change("/a.js", ChangeKind::Modified);
        let second = graph.get_stamp_for("/a.js").unwrap();

        assert_eq!(first, 1_000);
        assert_eq!(second, 1_001);
    }

    #[test]
    fn test_get_stamp_for_respects_scope() {
        let mut graph = DependencyGraph::with_config(GraphConfig {
            scope: Some("/src/".into()),
        });
        deps(&mut graph, "/src/a.js", &["/node_modules/lib.js"]);

        assert_eq!(graph.get_stamp_for("/src/a.js"), Some(0));
        assert_eq!(graph.get_stamp_for("/node_modules/lib.js"), None);
        assert_eq!(graph.get_stamp_for("/src/missing.js"), None);
    }

    #[test]
    fn test_find_dependent_searches_all_branches() {
        let (mut graph, _, _) = graph_with_log();
        deps(&mut graph, "/first.js", &["/leaf.js"]);
        deps(&mut graph, "/second.js", &["/leaf.js"]);
        graph.declare_resource(
            "/page.html",
            ResourceDecl::new().kind("html").dependencies(["/second.js"]),
        );

        let found = graph.find_dependent("/leaf.js", |r| r.kind == "html");
        assert_eq!(found.map(|r| r.id.as_str()), Some("/page.html"));
    }

    #[test]
    fn test_find_dependent_excludes_start_and_handles_cycles() {
        let (mut graph, _, _) = graph_with_log();
        graph.declare_resource(
            "/a.js",
            ResourceDecl::new().kind("html").dependencies(["/b.js"]),
        );
        deps(&mut graph, "/b.js", &["/a.js"]);

        assert!(graph.find_dependent("/a.js", |r| r.id == "/a.js").is_none());
        assert!(graph.find_dependent("/a.js", |r| r.kind == "css").is_none());
        assert!(graph.find_dependent("/missing.js", |_| true).is_none());
    }

    #[test]
    fn test_snapshot_is_sorted_and_skips_leaves() {
        let (mut graph, _, _) = graph_with_log();
        deps(&mut graph, "/z.js", &["/b.js", "/a.js"]);
        deps(&mut graph, "/m.js", &["/z.js"]);

        let snapshot = graph.snapshot();
        let keys: Vec<&str> = snapshot.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["/m.js", "/z.js"]);
        assert_eq!(snapshot["/z.js"], vec!["/b.js", "/a.js"]);
    }

    #[test]
    fn test_stats() {
        let (mut graph, _, _) = graph_with_log();
        graph.declare_resource(
            "/a.js",
            ResourceDecl::new().accepts_self(true).dependencies(["/b.js"]),
        );
        graph.declare_resource("/b.js", ResourceDecl::new().declines_reload(true));

        let stats = graph.stats();
        assert_eq!(stats.resource_count, 2);
        assert_eq!(stats.edge_count, 1);
        assert_eq!(stats.self_accepting, 1);
        assert_eq!(stats.declining, 1);
    }

    #[test]
    fn test_stamps_saturate_at_clock_limit() {
        let clock = ManualClock::new(u64::MAX);
        let mut graph = DependencyGraph::new().with_clock(clock);
        deps(&mut graph, "/a.js", &[]);

        graph.record_change("/a.js", ChangeKind::Modified);
        graph.record_change("/a.js", ChangeKind::Modified);

        assert_eq!(graph.get_stamp_for("/a.js"), Some(u64::MAX));
    }

    #[test]
    fn test_redeclared_order_keeps_existing_edges() {
        let (mut graph, _, _) = graph_with_log();
        deps(&mut graph, "/a.js", &["/b.js", "/c.js"]);
        deps(&mut graph, "/a.js", &["/c.js", "/b.js"]);

        assert_eq!(graph.dependencies_of("/a.js"), vec!["/b.js", "/c.js"]);
        assert_eq!(graph.snapshot()["/a.js"], vec!["/b.js", "/c.js"]);

        deps(&mut graph, "/a.js", &["/c.js", "/d.js", "/b.js"]);
        assert_eq!(
            graph.dependencies_of("/a.js"),
            vec!["/b.js", "/c.js", "/d.js"]
        );
    }

    /// `/m{i}.js` depends on `/m{i-1}.js`.
    fn chain(graph: &mut DependencyGraph, depth: usize) {
        for i in 1..=depth {
            let id = format!("/m{}.js", i);
            let dependency = format!("/m{}.js", i - 1);
            graph.declare_resource(&id, ResourceDecl::new().dependencies([dependency]));
        }
    }

    #[test]
    fn test_deep_chain_does_not_exhaust_stack() {
        const DEPTH: usize = 10_000;
        let (mut graph, log, _) = graph_with_log();
        chain(&mut graph, DEPTH);
        assert_eq!(graph.len(), DEPTH + 1);

        let outcome = graph.propagate_update("/m0.js").unwrap();
        assert_eq!(outcome, Outcome::declined(NO_ACCEPTING_RESOURCE, None));

        let update = graph.record_change("/m0.js", ChangeKind::Modified).unwrap();
        assert!(!update.outcome.is_accepted());
        let top = format!("/m{}.js", DEPTH);
        assert_eq!(graph.get_stamp_for(&top), Some(1_000));
        log.take();

        // Dropping the top's only dependency prunes the whole chain below it.
        deps(&mut graph, &top, &[]);
        let pruned = log.pruned();
        assert_eq!(pruned.len(), DEPTH);
        assert_eq!(pruned[0], format!("/m{}.js", DEPTH - 1));
        assert_eq!(pruned[DEPTH - 1], "/m0.js");
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_deep_chain_reaches_distant_boundary() {
        const DEPTH: usize = 10_000;
        let (mut graph, _, _) = graph_with_log();
        chain(&mut graph, DEPTH);
        let top = format!("/m{}.js", DEPTH);
        graph.declare_resource(&top, ResourceDecl::new().accepts_self(true));

        let outcome = graph.propagate_update("/m0.js").unwrap();
        assert_eq!(outcome.instructions(), &[Instruction::update(&top, &top)]);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_empty_identifier_panics() {
        let mut graph = DependencyGraph::new();
        graph.declare_resource("", ResourceDecl::new());
    }
}
