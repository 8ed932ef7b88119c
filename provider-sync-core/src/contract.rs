//! # contract: the seams of the sync pipeline
//!
//! Each external collaborator the orchestrator talks to sits behind a trait here, so
//! the pipeline can run against real clients in production and `mockall` mocks in tests.
//!
//! - [`ProviderRegistry`]: latest published version and source repository of a provider.
//! - [`ReleaseFeed`]: latest or version-specific tagged release (version + notes) of a
//!   source repository.
//! - [`Generator`]: regenerates a package into a disposable [`GeneratedWorkspace`].
//! - [`ReleaseStager`]: receives the final [`RunSummary`] for the release pipeline.
//!
//! Lookups return `Option` on purpose: any failure there is logged by the implementor
//! and means "skip this package", never "abort the run".

use async_trait::async_trait;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::Result;
use crate::generate::GeneratedWorkspace;
use crate::synchronise::RunSummary;

/// A release as reported by an upstream source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Version without a leading `v`.
    pub version: String,
    /// Release notes, already rewritten so issue references point upstream.
    pub changelog: Option<String>,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Latest published version; the first entry of the registry's version list.
    async fn latest_version(&self, namespace: &str, name: &str) -> Option<String>;

    /// URL of the provider's source repository, from the registry metadata.
    async fn source_repository(&self, namespace: &str, name: &str) -> Option<String>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn latest_release(&self, repo_url: &str) -> Option<ReleaseInfo>;

    /// The release tagged `v{version}`, or `{version}` when there is no such tag.
    async fn release_for_version(&self, repo_url: &str, version: &str) -> Option<ReleaseInfo>;
}

/// Regenerates the bindings for one provider version.
///
/// The returned workspace owns its temporary directory; dropping it removes the tree.
/// Implementations must leave nothing on disk when they return an error.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
        url: &str,
    ) -> Result<GeneratedWorkspace>;
}

/// The release-staging collaborator. Called exactly once per successful run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ReleaseStager: Send + Sync {
    fn stage(&self, summary: &RunSummary) -> Result<()>;
}
