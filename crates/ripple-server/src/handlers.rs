//! Request handlers for protocol methods.
//!
//! Each handler implements one JSON-RPC method against the shared graph.

use crate::protocol::{FindDependentParams, ResourceParams, Response};
use crate::SharedGraph;
use ripple_graph::GraphStats;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Handles the graph.info method.
pub async fn handle_info(graph: SharedGraph, id: Option<Value>) -> Response {
    let g = graph.read().await;

    #[derive(Serialize)]
    struct InfoResult {
        #[serde(flatten)]
        stats: GraphStats,
        scope: Option<String>,
        version: &'static str,
    }

    Response::success(
        id,
        InfoResult {
            stats: g.stats(),
            scope: g.config().scope.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}

/// Handles the graph.snapshot method.
pub async fn handle_snapshot(graph: SharedGraph, id: Option<Value>) -> Response {
    let g = graph.read().await;
    Response::success(id, g.snapshot())
}

/// Handles the resource.get method.
pub async fn handle_get(graph: SharedGraph, id: Option<Value>, params: ResourceParams) -> Response {
    let g = graph.read().await;

    let Some(resource) = g.get(&params.id) else {
        return Response::resource_not_found(id, &params.id);
    };

    #[derive(Serialize)]
    struct GetResult<'a> {
        #[serde(flatten)]
        resource: &'a ripple_graph::Resource,
        dependencies: Vec<&'a str>,
        dependents: Vec<&'a str>,
    }

    Response::success(
        id,
        GetResult {
            resource,
            dependencies: g.dependencies_of(&params.id),
            dependents: g.dependents_of(&params.id),
        },
    )
}

/// Handles the resource.stamp method.
///
/// Answers `null` for identifiers outside the managed scope or never seen.
pub async fn handle_stamp(
    graph: SharedGraph,
    id: Option<Value>,
    params: ResourceParams,
) -> Response {
    let g = graph.read().await;

    #[derive(Serialize)]
    struct StampResult {
        id: String,
        stamp: Option<u64>,
    }

    let stamp = g.get_stamp_for(&params.id);
    Response::success(
        id,
        StampResult {
            id: params.id,
            stamp,
        },
    )
}

/// Handles the propagate method: a dry-run boundary search.
pub async fn handle_propagate(
    graph: SharedGraph,
    id: Option<Value>,
    params: ResourceParams,
) -> Response {
    let g = graph.read().await;
    debug!("Propagate query: {}", params.id);

    match g.propagate_update(&params.id) {
        Some(outcome) => Response::success(id, outcome),
        None => Response::resource_not_found(id, &params.id),
    }
}

/// Handles the dependent.find method.
///
/// Returns the first transitive dependent matching every given filter, or
/// `null` when none does.
pub async fn handle_find_dependent(
    graph: SharedGraph,
    id: Option<Value>,
    params: FindDependentParams,
) -> Response {
    let g = graph.read().await;

    if !g.contains(&params.id) {
        return Response::resource_not_found(id, &params.id);
    }

    let found = g.find_dependent(&params.id, |resource| {
        params.kind.as_deref().map_or(true, |kind| resource.kind == kind)
            && params
                .accepts_self
                .map_or(true, |accepts| resource.accepts_self == accepts)
    });

    Response::success(id, found)
}
