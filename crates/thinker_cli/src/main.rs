//! Thinker CLI
//!
//! Clone and sync databases between two servers.
//!
//! A host is a server data directory laid out as `<host>/<db>/<table>.json`.
//!
//! # Commands
//!
//! - `clone` - Copy tables missing from the target database
//! - `sync` - Bring target tables in line with the source

mod commands;

use clap::{Parser, Subcommand};
use commands::ReplicationArgs;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Clone and sync document databases.
#[derive(Parser)]
#[command(name = "thinker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy tables missing from the target database
    Clone {
        #[command(flatten)]
        args: ReplicationArgs,

        /// Sync tables that already exist on the target instead of skipping them
        #[arg(long)]
        sync_existing: bool,
    },

    /// Bring target tables in line with the source
    Sync {
        #[command(flatten)]
        args: ReplicationArgs,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let report = match cli.command {
        Commands::Clone {
            args,
            sync_existing,
        } => commands::clone::run(&args, sync_existing).await?,
        Commands::Sync { args } => commands::sync::run(&args).await?,
    };

    commands::print_summary(&report);
    Ok(commands::exit_code(&report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_short_host_aliases() {
        let cli = Cli::try_parse_from([
            "thinker", "sync", "--sh", "/data/a", "--th", "/data/b", "--sd", "app", "--td",
            "copy", "--pt", "users,posts", "--no-progress", "--yes",
        ])
        .unwrap();

        let Commands::Sync { args } = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.source_host.to_str(), Some("/data/a"));
        assert_eq!(args.target_db, "copy");
        assert_eq!(args.tables, vec!["users", "posts"]);
        assert!(args.no_progress);
        assert!(args.yes);
        assert_eq!(args.batch_size, 1000);
        assert_eq!(args.workers, 4);
    }

    #[test]
    fn clone_accepts_sync_existing() {
        let cli = Cli::try_parse_from([
            "thinker",
            "clone",
            "--source-host",
            "a",
            "--target-host",
            "b",
            "--source-db",
            "x",
            "--target-db",
            "y",
            "--sync-existing",
            "--batch-size",
            "50",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Clone {
            args,
            sync_existing,
        } = cli.command
        else {
            panic!("expected clone");
        };
        assert!(sync_existing);
        assert_eq!(args.batch_size, 50);
        assert!(args.tables.is_empty());
    }
}
