//! Release staging: hands a finished run over to the monorepo's release tooling.
//!
//! When packages were updated, every change is staged with git. A release-plan command
//! can run first, for setups that record changes in each package's `CHANGELOG.md`
//! instead of writing release-note fragments; it is off by default because fragments
//! already are the release plan. Independently of that, the outcome is published as
//! step outputs for the CI workflow (`has_updates`, `update_summary`, `updates`) when an
//! output file is configured.

use provider_sync_core::config::CommandSpec;
use provider_sync_core::contract::ReleaseStager;
use provider_sync_core::error::{Result, SyncError};
use provider_sync_core::synchronise::RunSummary;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

const OUTPUT_DELIMITER: &str = "PROVIDER_SYNC_EOF";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Release-plan command, e.g. `pnpm nx release plan --message={message}`;
    /// `{message}` is replaced by the run's release message. Unset by default: fragment
    /// mode already writes one plan per update.
    pub plan: Option<CommandSpec>,
    /// Command staging the changed files. `null` disables it.
    pub stage_changes: Option<CommandSpec>,
    /// Working directory for both commands.
    pub workdir: PathBuf,
    /// Step-output file, injected from `GITHUB_OUTPUT`.
    #[serde(skip)]
    pub output_file: Option<PathBuf>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            plan: None,
            stage_changes: Some(CommandSpec::new("git", &["add", "."])),
            workdir: PathBuf::from("."),
            output_file: None,
        }
    }
}

pub struct CommandStager {
    config: StagingConfig,
}

impl CommandStager {
    pub fn new(config: StagingConfig) -> Self {
        Self { config }
    }

    fn run(&self, stage: &str, spec: &CommandSpec, message: &str) -> Result<()> {
        let args: Vec<String> = spec
            .args
            .iter()
            .map(|arg| arg.replace("{message}", message))
            .collect();
        info!(stage, program = %spec.program, "[SYNC][STAGE] Running release command");
        debug!(?args, workdir = %self.config.workdir.display(), "Release command arguments");

        let status = Command::new(&spec.program)
            .args(&args)
            .current_dir(&self.config.workdir)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                error!(stage, program = %spec.program, error = ?e, "Failed to launch release command");
                SyncError::Staging(format!("failed to launch {}: {e}", spec.program))
            })?;

        if !status.success() {
            error!(stage, program = %spec.program, %status, "Release command failed");
            return Err(SyncError::Staging(format!(
                "{stage}: {} exited with {status}",
                spec.program
            )));
        }
        Ok(())
    }
}

impl ReleaseStager for CommandStager {
    fn stage(&self, summary: &RunSummary) -> Result<()> {
        if summary.has_updates() {
            let message = summary.release_message();
            if let Some(plan) = &self.config.plan {
                self.run("plan", plan, &message)?;
            }
            if let Some(stage_changes) = &self.config.stage_changes {
                self.run("stage", stage_changes, &message)?;
            }
            info!(updates = summary.updates.len(), "[SYNC][STAGE] Changes staged");
        } else {
            info!("[SYNC][STAGE] Nothing to stage");
        }

        if let Some(path) = &self.config.output_file {
            write_outputs(path, summary)?;
        }
        Ok(())
    }
}

/// Step outputs in the `key=value` / `key<<DELIM` format the CI runner reads.
///
/// `updates` carries every [`UpdateDecision`](provider_sync_core::synchronise::UpdateDecision)
/// as a JSON array, bump kind and release notes included.
pub fn render_outputs(summary: &RunSummary) -> Result<String> {
    let updates = serde_json::to_string(&summary.updates)
        .map_err(|e| SyncError::Staging(format!("cannot serialise updates: {e}")))?;
    if !summary.has_updates() {
        return Ok(format!("has_updates=false\nupdates={updates}\n"));
    }
    Ok(format!(
        "has_updates=true\nupdate_summary<<{OUTPUT_DELIMITER}\n{}\n{OUTPUT_DELIMITER}\nupdates<<{OUTPUT_DELIMITER}\n{updates}\n{OUTPUT_DELIMITER}\n",
        summary.markdown_summary()
    ))
}

fn write_outputs(path: &Path, summary: &RunSummary) -> Result<()> {
    let staging_err =
        |e: std::io::Error| SyncError::Staging(format!("cannot write outputs to {}: {e}", path.display()));
    let outputs = render_outputs(summary)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(staging_err)?;
    file.write_all(outputs.as_bytes())
        .map_err(staging_err)?;
    debug!(path = %path.display(), "Wrote step outputs");
    Ok(())
}
