//! Provider registry client.
//!
//! Queries an OpenTofu/Terraform-compatible registry for the published versions of a
//! provider and for its source repository. Every failure is logged and reported as
//! `None` so the orchestrator can skip the package and carry on.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::config::RegistryConfig;
use crate::contract::ProviderRegistry;
use crate::error::{Result, SyncError};

#[derive(Debug, Deserialize)]
struct VersionsResponse {
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    source: Option<String>,
}

pub struct RegistryClient {
    client: Client,
    versions_url: String,
    metadata_url: String,
}

impl RegistryClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("provider-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            versions_url: config.versions_url.trim_end_matches('/').to_string(),
            metadata_url: config.metadata_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_latest_version(&self, namespace: &str, name: &str) -> Result<String> {
        let url = format!(
            "{}/v1/providers/{}/{}/versions",
            self.versions_url, namespace, name
        );
        debug!(url = %url, "Fetching provider versions");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: VersionsResponse = response.json().await?;

        // The registry lists newest first; that ordering is its contract, not checked here.
        body.versions
            .into_iter()
            .next()
            .map(|v| v.version)
            .ok_or_else(|| SyncError::NotFound(format!("no versions found for {namespace}/{name}")))
    }

    async fn fetch_source(&self, namespace: &str, name: &str) -> Result<String> {
        let url = format!("{}/v1/providers/{}/{}", self.metadata_url, namespace, name);
        debug!(url = %url, "Fetching provider metadata");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let metadata: ProviderMetadata = response.json().await?;
        metadata
            .source
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SyncError::NotFound(format!("no source repository for {namespace}/{name}")))
    }
}

#[async_trait]
impl ProviderRegistry for RegistryClient {
    async fn latest_version(&self, namespace: &str, name: &str) -> Option<String> {
        match self.fetch_latest_version(namespace, name).await {
            Ok(version) => Some(version),
            Err(SyncError::NotFound(msg)) => {
                warn!(provider = %format!("{namespace}/{name}"), "{msg}");
                None
            }
            Err(e) => {
                error!(provider = %format!("{namespace}/{name}"), error = %e, "Failed to fetch latest version");
                None
            }
        }
    }

    async fn source_repository(&self, namespace: &str, name: &str) -> Option<String> {
        match self.fetch_source(namespace, name).await {
            Ok(source) => Some(source),
            Err(e) => {
                debug!(provider = %format!("{namespace}/{name}"), error = %e, "No source repository from registry");
                None
            }
        }
    }
}
