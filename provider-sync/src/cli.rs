///
/// This module implements the CLI interface for provider-sync: command parsing, config
/// loading and wiring the concrete clients into the core pipeline.
///
/// All pipeline logic lives in the [`provider-sync-core`] crate.
///
/// ## How To Use
/// - For command-line users: use the installed `provider-sync` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`provider-sync-core`]: ../../provider-sync-core/
use crate::load_config::load_or_default;
use crate::staging::CommandStager;
use anyhow::Result;
use clap::{Parser, Subcommand};
use provider_sync_core::generate::CommandGenerator;
use provider_sync_core::registry::RegistryClient;
use provider_sync_core::release::ReleaseFetcher;
use provider_sync_core::synchronise::{synchronise, RunSummary};
use std::path::PathBuf;

/// CLI for provider-sync: keep wrapped provider packages in step with upstream.
#[derive(Parser)]
#[clap(
    name = "provider-sync",
    version,
    about = "Check upstream provider releases, regenerate stale packages and stage a release"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Update every stale package and stage a release plan
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Directory holding the managed packages
        #[clap(long)]
        packages_root: Option<PathBuf>,
    },
    /// Report stale packages without changing anything
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
        /// Directory holding the managed packages
        #[clap(long)]
        packages_root: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let (command, config_path, packages_root, dry_run) = match cli.command {
        Commands::Sync {
            config,
            packages_root,
        } => ("sync", config, packages_root, false),
        Commands::Check {
            config,
            packages_root,
        } => ("check", config, packages_root, true),
    };

    let mut config = load_or_default(config_path.as_deref())?;
    if let Some(root) = packages_root {
        config.sync.packages_root = root;
    }
    config.sync.dry_run |= dry_run;
    config.sync.trace_loaded();

    let registry = RegistryClient::new(&config.sync.registry)?;
    let releases = ReleaseFetcher::new(&config.sync.releases)?;
    let generator = CommandGenerator::new(config.sync.generator.clone());
    let stager = CommandStager::new(config.staging.clone());

    tracing::info!(command, "Starting synchronisation process");
    match synchronise(&config.sync, &registry, &releases, &generator, &stager).await {
        Ok(summary) => {
            tracing::info!(command, updates = summary.updates.len(), "Synchronisation complete");
            print_summary(&summary, config.sync.dry_run);
            Ok(())
        }
        Err(e) => {
            tracing::error!(command, error = %e, "Synchronisation failed");
            Err(e.into())
        }
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    if !summary.has_updates() {
        println!("No updates available");
        return;
    }
    if dry_run {
        println!("{} package(s) can be updated", summary.updates.len());
    } else {
        println!("Updated {} package(s)", summary.updates.len());
    }
    println!("{}", summary.markdown_summary());
}
