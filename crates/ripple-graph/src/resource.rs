//! Resource records stored in the dependency graph.
//!
//! A resource is one loaded module: an HTML page, a script, a stylesheet.
//! Its edges live in the graph itself; the record only carries the scalar
//! facts the loader declared about it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A tracked module, keyed by its canonical identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Canonical identifier, e.g. `/src/main.js`.
    pub id: String,

    /// Module category ("html", "js_module", ...). Empty until declared.
    pub kind: String,

    /// Freshness stamp. 0 means the resource was never updated.
    pub stamp: u64,

    /// The resource can be hot-swapped in place.
    pub accepts_self: bool,

    /// Dependencies whose updates this resource absorbs on its own.
    pub accepts_dependencies: BTreeSet<String>,

    /// The resource vetoes silent hot updates and pruning.
    pub declines_reload: bool,
}

impl Resource {
    /// Creates a resource with default flags.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: String::new(),
            stamp: 0,
            accepts_self: false,
            accepts_dependencies: BTreeSet::new(),
            declines_reload: false,
        }
    }

    /// Returns true if this resource absorbs updates of `dependency`.
    pub fn accepts_dependency(&self, dependency: &str) -> bool {
        self.accepts_dependencies.contains(dependency)
    }

    /// Applies the fields present in a declaration, leaving the rest alone.
    pub(crate) fn merge(&mut self, decl: &ResourceDecl) {
        if let Some(kind) = &decl.kind {
            self.kind = kind.clone();
        }
        if let Some(accepts_self) = decl.accepts_self {
            self.accepts_self = accepts_self;
        }
        if let Some(accepted) = &decl.accepts_dependencies {
            self.accepts_dependencies = accepted.iter().cloned().collect();
        }
        if let Some(declines) = decl.declines_reload {
            self.declines_reload = declines;
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.id, self.kind)
        }
    }
}

/// What a loader knows about a resource after (re)loading it.
///
/// Every field is optional. `None` keeps whatever the graph already holds,
/// so a declaration is a merge and never a reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Full dependency list. Ids missing from it are detached and pruned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts_self: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts_dependencies: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declines_reload: Option<bool>,
}

impl ResourceDecl {
    /// Creates an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    pub fn accepts_self(mut self, accepts: bool) -> Self {
        self.accepts_self = Some(accepts);
        self
    }

    pub fn accepts_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepts_dependencies = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    pub fn declines_reload(mut self, declines: bool) -> Self {
        self.declines_reload = Some(declines);
        self
    }
}
