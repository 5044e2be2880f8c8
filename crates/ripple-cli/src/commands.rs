//! CLI command implementations.

use colored::Colorize;
use ripple_graph::{
    ChangeKind, DependencyGraph, EventLog, GraphConfig, InstructionKind, Manifest, Outcome,
};
use ripple_server::{HotServer, ServerConfig};
use ripple_watcher::WatchConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const CONFIG_DIR: &str = ".ripple";
const CONFIG_FILE: &str = "config.json";

/// Project settings stored in `.ripple/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Manifest path, relative to the project root.
    pub manifest: PathBuf,
    pub port: u16,
    pub debounce_ms: u64,
    pub extensions: Vec<String>,
    /// Identifier prefix managed by the graph.
    pub scope: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let watch = WatchConfig::default();
        Self {
            manifest: PathBuf::from("ripple.json"),
            port: ServerConfig::default().addr.port(),
            debounce_ms: watch.debounce_ms,
            extensions: watch.extensions,
            scope: None,
        }
    }
}

impl ProjectConfig {
    fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Loads the config under `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root.join(CONFIG_DIR))?;
        fs::write(Self::path(root), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// The project a command runs against.
struct Project {
    root: PathBuf,
    config: ProjectConfig,
    graph: DependencyGraph,
}

impl Project {
    /// Loads config and manifest from the current directory.
    fn open(manifest: Option<&Path>) -> Result<Self> {
        Self::open_at(&std::env::current_dir()?, manifest)
    }

    fn open_at(root: &Path, manifest: Option<&Path>) -> Result<Self> {
        let config = ProjectConfig::load(root)?;
        let manifest_path = match manifest {
            Some(path) => path.to_path_buf(),
            None => root.join(&config.manifest),
        };

        let loaded = Manifest::load(&manifest_path)
            .map_err(|e| format!("cannot load {}: {}", manifest_path.display(), e))?;

        let mut graph = DependencyGraph::with_config(GraphConfig {
            scope: config.scope.clone(),
        });
        loaded.apply(&mut graph);
        debug!(
            "Loaded {} resources from {}",
            graph.len(),
            manifest_path.display()
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            graph,
        })
    }

    fn require(&self, id: &str) -> Result<()> {
        if self.graph.contains(id) {
            Ok(())
        } else {
            Err(format!("Resource '{}' not found in graph", id).into())
        }
    }
}

/// Initialize Ripple in a directory.
pub fn init(path: &Path) -> Result<()> {
    if ProjectConfig::path(path).exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    let config = ProjectConfig::default();
    config.save(path)?;

    let manifest_path = path.join(&config.manifest);
    if !manifest_path.exists() {
        Manifest::default().save(&manifest_path)?;
        println!("  Created empty manifest {}", manifest_path.display());
    }

    println!("{} Initialized Ripple in {}", "✓".green(), path.display());
    println!(
        "  Declare resources in {}, then run {}",
        config.manifest.display().to_string().cyan(),
        "ripple serve".cyan()
    );

    Ok(())
}

/// Print every resource with its dependencies.
pub fn inspect(manifest: Option<&Path>, json_output: bool) -> Result<()> {
    let project = Project::open(manifest)?;
    let graph = &project.graph;

    if json_output {
        let output = serde_json::json!({
            "stats": graph.stats(),
            "resources": graph.snapshot(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let stats = graph.stats();
    println!(
        "{} resources, {} edges ({} self-accepting, {} declining)\n",
        stats.resource_count.to_string().cyan(),
        stats.edge_count.to_string().cyan(),
        stats.self_accepting,
        stats.declining
    );

    for (id, dependencies) in graph.snapshot() {
        let Some(resource) = graph.get(&id) else {
            continue;
        };
        let mut flags = Vec::new();
        if resource.accepts_self {
            flags.push("accepts self".green().to_string());
        }
        if resource.declines_reload {
            flags.push("declines".red().to_string());
        }
        println!(
            "  {} {} {}",
            id.cyan(),
            resource.kind.dimmed(),
            flags.join(", ")
        );
        for dependency in dependencies {
            let marker = if resource.accepts_dependency(&dependency) {
                "⇠".green()
            } else {
                "←".dimmed()
            };
            println!("    {} {}", marker, dependency);
        }
    }

    Ok(())
}

/// Dry-run the boundary search for a change to `id`.
pub fn propagate(manifest: Option<&Path>, id: &str, json_output: bool) -> Result<()> {
    let project = Project::open(manifest)?;
    project.require(id)?;

    let Some(outcome) = project.graph.propagate_update(id) else {
        return Ok(());
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

/// Record a change to `id` and report the resulting events.
pub fn change(manifest: Option<&Path>, id: &str, kind: ChangeKind, json_output: bool) -> Result<()> {
    let mut project = Project::open(manifest)?;
    project.require(id)?;

    let log = EventLog::new();
    project.graph.subscribe(log.clone());
    project.graph.record_change(id, kind);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&log.events())?);
        return Ok(());
    }

    for update in log.hot_updates() {
        println!("{}", update.cause.bold());
        print_outcome(&update.outcome);
    }

    let mut stamped: Vec<_> = project
        .graph
        .resources()
        .filter(|resource| resource.stamp > 0)
        .collect();
    stamped.sort_by(|a, b| a.id.cmp(&b.id));
    if !stamped.is_empty() {
        println!("\nStamped:");
        for resource in stamped {
            println!("  {} {}", resource.id.cyan(), resource.stamp);
        }
    }

    Ok(())
}

/// Print the freshness stamp of `id`.
pub fn stamp(manifest: Option<&Path>, id: &str) -> Result<()> {
    let project = Project::open(manifest)?;

    match project.graph.get_stamp_for(id) {
        Some(stamp) => println!("{} {}", id.cyan(), stamp),
        None => println!("{} {}", id.cyan(), "not managed".dimmed()),
    }

    Ok(())
}

/// Find the first transitive dependent of `id` of the given kind.
pub fn dependent(manifest: Option<&Path>, id: &str, kind: &str) -> Result<()> {
    let project = Project::open(manifest)?;
    project.require(id)?;

    match project.graph.find_dependent(id, |resource| resource.kind == kind) {
        Some(resource) => println!("{}", resource.id.cyan()),
        None => println!("No {} depends on {}", kind.yellow(), id),
    }

    Ok(())
}

/// Start the hot-update server with file watching.
pub async fn serve(manifest: Option<&Path>, port: Option<u16>) -> Result<()> {
    println!("{}", "Starting Ripple server...".cyan());

    let project = Project::open(manifest)?;
    let port = port.unwrap_or(project.config.port);

    println!(
        "{} Loaded {} resources ({} edges)",
        "✓".green(),
        project.graph.len(),
        project.graph.edge_count()
    );

    let watch = WatchConfig {
        root: project.root.clone(),
        debounce_ms: project.config.debounce_ms,
        extensions: project.config.extensions.clone(),
    };
    let config = ServerConfig {
        addr: format!("127.0.0.1:{}", port).parse()?,
    };
    let server = HotServer::new(project.graph, config);

    println!("{} Listening on ws://127.0.0.1:{}", "✓".green(), port);
    println!("  Watching {}", project.root.display());
    println!("  Press {} to stop", "Ctrl+C".cyan());

    server
        .run_with_watcher(watch)
        .await
        .map_err(|e| e.to_string())?;

    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Accepted {
            reason,
            instructions,
        } => {
            println!("{} {}", "✓ accepted:".green().bold(), reason);
            for instruction in instructions {
                let verb = match instruction.kind {
                    InstructionKind::Update => "update".green(),
                    InstructionKind::Prune => "prune".yellow(),
                };
                println!(
                    "  {} {} (absorbs {})",
                    verb,
                    instruction.boundary.cyan(),
                    instruction.accepted_by
                );
            }
        }
        Outcome::Declined {
            reason,
            declined_by,
        } => {
            println!("{} {}", "✗ full reload:".red().bold(), reason);
            if let Some(by) = declined_by {
                println!("  declined by {}", by.cyan());
            }
        }
    }
}
