//! JSON manifests describing loaded resources.
//!
//! A manifest plays the loader's part when no real module loader is wired
//! in: each entry becomes one `declare_resource` call, applied in order.

use crate::graph::DependencyGraph;
use crate::resource::ResourceDecl;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Entry {index} has an empty identifier")]
    EmptyIdentifier { index: usize },
}

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(flatten)]
    pub decl: ResourceDecl,
}

/// A list of resource declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<ManifestEntry>,
}

impl Manifest {
    /// Reads a manifest from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses and validates a manifest.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Writes the manifest as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Declares every entry on the graph, in manifest order.
    pub fn apply(&self, graph: &mut DependencyGraph) {
        for entry in &self.resources {
            graph.declare_resource(&entry.id, entry.decl.clone());
        }
    }

    /// Builds a manifest that recreates the current graph.
    ///
    /// Entries are sorted by identifier. Stamps are not carried over.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let mut resources: Vec<ManifestEntry> = graph
            .resources()
            .map(|resource| {
                let dependencies: Vec<String> = graph
                    .dependencies_of(&resource.id)
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                ManifestEntry {
                    id: resource.id.clone(),
                    decl: ResourceDecl {
                        kind: (!resource.kind.is_empty()).then(|| resource.kind.clone()),
                        dependencies: Some(dependencies),
                        accepts_self: Some(resource.accepts_self),
                        accepts_dependencies: Some(
                            resource.accepts_dependencies.iter().cloned().collect(),
                        ),
                        declines_reload: Some(resource.declines_reload),
                    },
                }
            })
            .collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        Self { resources }
    }

    fn validate(&self) -> Result<(), ManifestError> {
        for (index, entry) in self.resources.iter().enumerate() {
            let empty_dependency = entry
                .decl
                .dependencies
                .iter()
                .flatten()
                .any(|dependency| dependency.is_empty());
            if entry.id.is_empty() || empty_dependency {
                return Err(ManifestError::EmptyIdentifier { index });
            }
        }
        Ok(())
    }
}
