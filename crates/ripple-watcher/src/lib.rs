//! Ripple Watcher - filesystem events as graph changes
//!
//! Watches a project root, debounces raw notify events and turns every
//! settled path into a [`FileChange`] carrying the same canonical
//! identifier the loader used when declaring the resource.
//!
//! Identifiers are root-relative, `/`-separated and `/`-prefixed, so
//! `<root>/src/main.js` becomes `/src/main.js` on every platform.

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use ripple_graph::ChangeKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Watch root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),
}

/// Configuration for the file watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Root path to watch. Identifiers are relative to it.
    pub root: PathBuf,
    /// Debounce duration for file events.
    pub debounce_ms: u64,
    /// File extensions to watch.
    pub extensions: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            debounce_ms: 150,
            extensions: vec![
                "html".into(),
                "js".into(),
                "mjs".into(),
                "jsx".into(),
                "ts".into(),
                "tsx".into(),
                "css".into(),
                "json".into(),
            ],
        }
    }
}

/// A settled change to one watched file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Canonical identifier of the file.
    pub id: String,
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Converts a path under `root` into its canonical identifier.
///
/// Returns `None` for the root itself and for paths outside it.
pub fn canonical_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut id = String::new();

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                id.push('/');
                id.push_str(&part.to_string_lossy());
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Checks if a file should be processed based on extension.
pub fn should_process_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e == ext))
        .unwrap_or(false)
}

/// Remembers which files exist so a settled event can be told apart as
/// an addition, a modification or a removal.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    known: HashSet<PathBuf>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks `root` and records every file with a watched extension.
    pub fn scan(root: &Path, extensions: &[String]) -> Self {
        let known = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| should_process_file(path, extensions))
            .collect();
        Self { known }
    }

    /// Classifies an event on `path` and updates the index.
    pub fn classify(&mut self, path: &Path, exists: bool) -> ChangeKind {
        if !exists {
            self.known.remove(path);
            return ChangeKind::Removed;
        }
        if self.known.insert(path.to_path_buf()) {
            ChangeKind::Added
        } else {
            ChangeKind::Modified
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.known.contains(path)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// Turns one debounced path into a change, if it is watched.
fn to_change(
    root: &Path,
    extensions: &[String],
    index: &mut FileIndex,
    path: &Path,
) -> Option<FileChange> {
    if !should_process_file(path, extensions) {
        return None;
    }
    let id = canonical_id(root, path)?;
    let kind = index.classify(path, path.exists());
    Some(FileChange {
        id,
        path: path.to_path_buf(),
        kind,
    })
}

/// Runs the file watcher until the receiving side of `tx` is dropped.
pub async fn run_watcher(
    config: WatchConfig,
    tx: mpsc::Sender<FileChange>,
) -> Result<(), WatchError> {
    if !config.root.exists() {
        return Err(WatchError::RootNotFound(config.root));
    }
    let root = config.root.canonicalize()?;
    let mut index = FileIndex::scan(&root, &config.extensions);

    let (raw_tx, mut raw_rx) = mpsc::channel::<DebounceEventResult>(256);

    // The debouncer calls back from its own thread.
    let mut debouncer = new_debouncer(
        Duration::from_millis(config.debounce_ms),
        move |result: DebounceEventResult| {
            let _ = raw_tx.blocking_send(result);
        },
    )?;
    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)?;

    info!(
        "File watcher started for {} ({} files, {}ms debounce)",
        root.display(),
        index.len(),
        config.debounce_ms
    );

    while let Some(result) = raw_rx.recv().await {
        let events = match result {
            Ok(events) => events,
            Err(e) => {
                warn!("Watch error: {}", e);
                continue;
            }
        };

        for event in events {
            let Some(change) = to_change(&root, &config.extensions, &mut index, &event.path)
            else {
                continue;
            };
            debug!("{} was {}", change.id, change.kind);
            if tx.send(change).await.is_err() {
                debug!("Change receiver closed, stopping watcher");
                return Ok(());
            }
        }
    }

    Ok(())
}
