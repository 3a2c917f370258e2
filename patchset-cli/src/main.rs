//! patchset: batch-commit object edits to a versioned store.
//!
//! # Usage
//!
//! ```text
//! patchset catalog upsert <name> --version <v> [--description d] [--group g] [--alias a]...
//! patchset catalog get <name> [--json]
//! patchset catalog list [--json]
//! patchset catalog delete <name>
//! patchset apply <store.yaml> --edits <edits.yaml> [--dry-run] [--timeout <secs>] [--concurrency <n>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{apply::ApplyArgs, catalog::CatalogCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "patchset",
    version,
    about = "Commit only the changed parts of tracked objects to a versioned store",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the local plugin catalog.
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },

    /// Apply an edits file to a store file, patching only what changed.
    Apply(ApplyArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Catalog { command } => commands::catalog::run(command),
        Commands::Apply(args) => args.run(),
    }
}

/// Logs go to stderr so table and JSON output stay clean. `RUST_LOG`
/// overrides the default `warn` level.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
