//! Ripple CLI - Command-line interface for Ripple
//!
//! Loads a resource manifest into a dependency graph and answers hot-update
//! questions about it, or serves the graph over WebSocket while watching
//! the project for changes.

use clap::{Parser, Subcommand};
use colored::Colorize;
use ripple_graph::ChangeKind;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "ripple")]
#[command(author = "Ripple Contributors")]
#[command(version)]
#[command(about = "Module dependency graph with hot-update propagation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Manifest to load instead of the one named in .ripple/config.json
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Ripple in a directory
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show every resource and its dependencies
    Inspect {
        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Decide whether a change could be hot-applied, without recording it
    Propagate {
        /// Identifier of the changed resource
        id: String,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Record a change and show the resulting events and stamps
    Change {
        /// Identifier of the changed resource
        id: String,

        /// Kind of change: modified, added or removed
        #[arg(short, long, default_value = "modified")]
        kind: ChangeKind,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Print the freshness stamp of a resource
    Stamp {
        /// Resource identifier
        id: String,
    },

    /// Find the nearest transitive dependent of a given kind
    Dependent {
        /// Resource identifier
        id: String,

        /// Kind the dependent must have, e.g. "html"
        #[arg(short, long)]
        kind: String,
    },

    /// Start the hot-update server and watch for changes
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let manifest = cli.manifest.as_deref();
    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Inspect { json } => commands::inspect(manifest, json),
        Commands::Propagate { id, json } => commands::propagate(manifest, &id, json),
        Commands::Change { id, kind, json } => commands::change(manifest, &id, kind, json),
        Commands::Stamp { id } => commands::stamp(manifest, &id),
        Commands::Dependent { id, kind } => commands::dependent(manifest, &id, &kind),
        Commands::Serve { port } => commands::serve(manifest, port).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
