//! Hot-update boundary search.
//!
//! Walks the dependents of a changed resource looking for the nearest
//! resources that promise to absorb the change. It answers the question:
//! "can this change be applied in place, and who has to react?"
//!
//! Cycle detection here is path-local. A resource reachable through two
//! different dependents is visited once per path, so a diamond yields one
//! instruction per branch. Any veto ends the whole search.

use crate::event::{Instruction, Outcome};
use crate::graph::{DependencyGraph, ResourceId};
use petgraph::Direction;
use std::collections::HashSet;

pub const CHANGED_RESOURCE_ACCEPTS: &str = "the changed resource accepts hot reload";
pub const DEPENDENT_ACCEPTS: &str = "a dependent resource accepts hot reload";
pub const DEPENDENT_DECLINES: &str = "a dependent resource declines hot reload";
pub const CIRCULAR_DEPENDENCY: &str = "circular dependency";
pub const NO_ACCEPTING_RESOURCE: &str =
    "no resource accepting hot reload while propagating update";

/// One resource on the current search path.
struct Frame {
    node: ResourceId,
    dependents: Vec<ResourceId>,
    cursor: usize,
    instructions: Vec<Instruction>,
}

impl Frame {
    fn new(graph: &DependencyGraph, node: ResourceId) -> Self {
        Self {
            node,
            dependents: graph.ordered_neighbors(node, Direction::Incoming),
            cursor: 0,
            instructions: Vec::new(),
        }
    }

    fn finish(self) -> Outcome {
        if self.instructions.is_empty() {
            Outcome::declined(NO_ACCEPTING_RESOURCE, None)
        } else {
            Outcome::accepted(
                format!(
                    "{} dependent resource(s) accept hot reload",
                    self.instructions.len()
                ),
                self.instructions,
            )
        }
    }
}

enum Step {
    Descend(ResourceId),
    Exhausted,
    Veto(Outcome),
}

impl DependencyGraph {
    /// Decides whether a change to `id` can be hot-applied, without
    /// touching stamps or notifying listeners.
    ///
    /// Returns `None` for an untracked identifier.
    pub fn propagate_update(&self, id: &str) -> Option<Outcome> {
        let index = self.index_of(id)?;
        Some(self.propagate_update_from(index))
    }

    /// Depth-first search over dependents on an explicit stack of frames.
    /// `trace` holds the resources on the current path only.
    pub(crate) fn propagate_update_from(&self, root: ResourceId) -> Outcome {
        let resource = &self.graph[root];
        if resource.accepts_self {
            return Outcome::accepted(
                CHANGED_RESOURCE_ACCEPTS,
                vec![Instruction::update(&resource.id, &resource.id)],
            );
        }

        let mut trace = HashSet::from([root]);
        let mut stack = vec![Frame::new(self, root)];
        let mut finished: Option<Outcome> = None;

        while let Some(frame) = stack.last_mut() {
            match finished.take() {
                Some(Outcome::Accepted { instructions, .. }) => {
                    frame.instructions.extend(instructions)
                }
                Some(veto @ Outcome::Declined {
                    declined_by: Some(_),
                    ..
                }) => return veto,
                // Nothing up that branch accepts; other branches may still.
                Some(Outcome::Declined {
                    declined_by: None, ..
                })
                | None => {}
            }

            match self.advance(frame, &trace) {
                Step::Veto(outcome) => return outcome,
                Step::Descend(next) => {
                    let dependent = &self.graph[next];
                    if dependent.accepts_self {
                        finished = Some(Outcome::accepted(
                            DEPENDENT_ACCEPTS,
                            vec![Instruction::update(&dependent.id, &dependent.id)],
                        ));
                    } else {
                        trace.insert(next);
                        stack.push(Frame::new(self, next));
                    }
                }
                Step::Exhausted => {
                    let Some(done) = stack.pop() else { break };
                    trace.remove(&done.node);
                    finished = Some(done.finish());
                }
            }
        }

        finished.unwrap_or_else(|| Outcome::declined(NO_ACCEPTING_RESOURCE, None))
    }

    /// Scans the remaining dependents of `frame` until one needs a visit of
    /// its own.
    fn advance(&self, frame: &mut Frame, trace: &HashSet<ResourceId>) -> Step {
        let resource = &self.graph[frame.node];

        while let Some(&dependent_index) = frame.dependents.get(frame.cursor) {
            frame.cursor += 1;
            let dependent = &self.graph[dependent_index];

            if dependent.declines_reload {
                return Step::Veto(Outcome::declined(
                    DEPENDENT_DECLINES,
                    Some(dependent.id.clone()),
                ));
            }

            if dependent.accepts_dependency(&resource.id) {
                frame
                    .instructions
                    .push(Instruction::update(&dependent.id, &resource.id));
                continue;
            }

            if trace.contains(&dependent_index) {
                return Step::Veto(Outcome::declined(
                    CIRCULAR_DEPENDENCY,
                    Some(dependent.id.clone()),
                ));
            }

            return Step::Descend(dependent_index);
        }

        Step::Exhausted
    }
}
