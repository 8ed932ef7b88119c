//! High-level pipeline: orchestrates resolve → regenerate → merge → record for every
//! managed package.
//!
//! Packages are processed one at a time, in discovery order. Each one ends in a
//! [`PackageOutcome`]:
//!   - `UpToDate` when the pinned version is the latest one
//!   - `Skipped` when no reference, version or release could be resolved (logged, never fatal)
//!   - `Updated` once the package has been regenerated, merged, re-pinned and recorded
//!
//! # Error Handling
//! Lookup failures become skips. Any failure once regeneration has started aborts the
//! whole run: packages updated earlier stay changed on disk and the [`ReleaseStager`]
//! is not invoked.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Supporting types: [`UpdateDecision`], [`RunSummary`], [`PackageOutcome`]

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::changelog;
use crate::config::SynchroniseConfig;
use crate::contract::{Generator, ProviderRegistry, ReleaseFeed, ReleaseInfo, ReleaseStager};
use crate::error::Result;
use crate::merge;
use crate::provider::{discover_packages, pin_manifest, ManagedPackage};
use crate::version::{compare, BumpKind};

/// A package that needs (or, after a run, received) a new provider version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateDecision {
    pub package: String,
    pub path: PathBuf,
    pub old_version: String,
    pub new_version: String,
    pub bump: BumpKind,
    /// Upstream release notes for `new_version`, if the release feed had them.
    pub changelog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    UpToDate,
    Skipped(String),
    Updated(UpdateDecision),
}

/// Result of a full run, handed to the [`ReleaseStager`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Updates in the order the packages were processed.
    pub updates: Vec<UpdateDecision>,
    pub skipped: usize,
    pub up_to_date: usize,
}

impl RunSummary {
    pub fn has_updates(&self) -> bool {
        !self.updates.is_empty()
    }

    pub fn record(&mut self, outcome: PackageOutcome) {
        match outcome {
            PackageOutcome::UpToDate => self.up_to_date += 1,
            PackageOutcome::Skipped(_) => self.skipped += 1,
            PackageOutcome::Updated(decision) => self.updates.push(decision),
        }
    }

    /// One markdown bullet per update: `- **name**: old → new`.
    pub fn markdown_summary(&self) -> String {
        self.updates
            .iter()
            .map(|u| format!("- **{}**: {} → {}", u.package, u.old_version, u.new_version))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Message for the release plan, one paragraph per update.
    pub fn release_message(&self) -> String {
        self.updates
            .iter()
            .map(|u| format!("Update {} from {} to {}", u.package, u.old_version, u.new_version))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Conventional repository of a Terraform provider, used when the registry has no `source`.
pub fn fallback_source_url(namespace: &str, name: &str) -> String {
    format!("https://github.com/{namespace}/terraform-provider-{name}")
}

/// Run the pipeline over every package under `config.packages_root`.
///
/// The stager is called exactly once, after all packages succeeded, and not at all in
/// a dry run.
pub async fn synchronise<R, F, G, S>(
    config: &SynchroniseConfig,
    registry: &R,
    releases: &F,
    generator: &G,
    stager: &S,
) -> Result<RunSummary>
where
    R: ProviderRegistry,
    F: ReleaseFeed,
    G: Generator,
    S: ReleaseStager,
{
    info!(dry_run = config.dry_run, "[SYNC] Starting provider synchronisation");

    let packages = discover_packages(&config.packages_root)?;
    let mut summary = RunSummary::default();

    for path in &packages {
        let outcome = sync_package(config, path, registry, releases, generator)
            .await
            .inspect_err(|e| {
                error!(package = %path.display(), error = %e, "[SYNC][ERROR] Aborting run");
            })?;
        summary.record(outcome);
    }

    info!(
        updated = summary.updates.len(),
        up_to_date = summary.up_to_date,
        skipped = summary.skipped,
        "[SYNC] Finished processing packages"
    );

    if config.dry_run {
        info!("[SYNC] Dry run; skipping release staging");
        return Ok(summary);
    }

    stager.stage(&summary).inspect_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Release staging failed");
    })?;
    info!("[SYNC][STAGE] Handed summary to release staging");
    Ok(summary)
}

/// Resolve and, when stale, update a single package.
pub async fn sync_package<R, F, G>(
    config: &SynchroniseConfig,
    path: &Path,
    registry: &R,
    releases: &F,
    generator: &G,
) -> Result<PackageOutcome>
where
    R: ProviderRegistry,
    F: ReleaseFeed,
    G: Generator,
{
    let package = match ManagedPackage::load(path) {
        Ok(package) => package,
        Err(e) if !e.is_fatal() => {
            warn!(package = %path.display(), reason = %e, "[SYNC] Skipping package");
            return Ok(PackageOutcome::Skipped(e.to_string()));
        }
        Err(e) => return Err(e),
    };
    let provider = &package.provider;
    info!(
        package = %package.name,
        provider = %provider.slug(),
        current = %provider.version,
        "[SYNC] Checking package"
    );

    let source = match registry
        .source_repository(&provider.namespace, &provider.name)
        .await
    {
        Some(source) => source,
        None => {
            let fallback = fallback_source_url(&provider.namespace, &provider.name);
            debug!(source = %fallback, "Using conventional source repository");
            fallback
        }
    };

    let mut feed_latest: Option<ReleaseInfo> = None;
    let latest = match registry.latest_version(&provider.namespace, &provider.name).await {
        Some(version) => version,
        None => {
            feed_latest = releases.latest_release(&source).await;
            match feed_latest.as_ref().map(|r| r.version.clone()) {
                Some(version) => {
                    info!(version = %version, "[SYNC] Resolved version from release feed");
                    version
                }
                None => {
                    warn!(package = %package.name, "[SYNC] No upstream version found; skipping");
                    return Ok(PackageOutcome::Skipped(format!(
                        "no upstream version for {}",
                        provider.slug()
                    )));
                }
            }
        }
    };

    let comparison = compare(&provider.version, &latest);
    if comparison.equal {
        info!(package = %package.name, version = %latest, "[SYNC] Already up to date");
        return Ok(PackageOutcome::UpToDate);
    }

    // Notes belong to the exact version being installed, which may lag the feed.
    let release = match feed_latest.filter(|r| r.version == latest) {
        Some(release) => Some(release),
        None => releases.release_for_version(&source, &latest).await,
    };
    let notes = release.and_then(|r| r.changelog);

    let decision = UpdateDecision {
        package: package.name.clone(),
        path: package.path.clone(),
        old_version: provider.version.clone(),
        new_version: latest,
        bump: comparison.bump,
        changelog: notes,
    };
    info!(
        package = %decision.package,
        from = %decision.old_version,
        to = %decision.new_version,
        bump = %decision.bump,
        "[SYNC] Update available"
    );

    if config.dry_run {
        return Ok(PackageOutcome::Updated(decision));
    }

    apply_update(config, &package, &decision, generator)?;
    Ok(PackageOutcome::Updated(decision))
}

fn apply_update<G: Generator>(
    config: &SynchroniseConfig,
    package: &ManagedPackage,
    decision: &UpdateDecision,
    generator: &G,
) -> Result<()> {
    let provider = &package.provider;

    if config.generator.enabled {
        let workspace = generator.generate(
            &provider.namespace,
            &provider.name,
            &decision.new_version,
            &provider.url,
        )?;
        merge::merge(workspace.package_dir(), &package.path)?;
        workspace.close()?;
    } else {
        debug!(package = %package.name, "Generation disabled; re-pinning only");
    }

    pin_manifest(
        &package.manifest_path(),
        &provider.with_version(&decision.new_version),
    )?;

    let now = Utc::now();
    if config.changelog.writes_changelog() {
        changelog::record_update(
            &package.path,
            &decision.new_version,
            decision.changelog.as_deref(),
            now.date_naive(),
        )?;
    }
    if config.changelog.writes_fragment() {
        changelog::write_fragment(&config.changelog.staging_dir, decision, now)?;
    }

    info!(package = %package.name, version = %decision.new_version, "[SYNC] Package updated");
    Ok(())
}
