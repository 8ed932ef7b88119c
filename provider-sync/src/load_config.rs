/// `load_config` module: loads the optional YAML config file and injects environment values.
///
/// The YAML file carries no secrets. The release-feed token and the CI step-output file
/// only ever come from the environment, and the packages root may be overridden there.
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are
/// surfaced at the CLI boundary.
use anyhow::Result;
use provider_sync_core::config::SynchroniseConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::staging::StagingConfig;

pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const OUTPUT_ENV: &str = "GITHUB_OUTPUT";
pub const PACKAGES_ENV: &str = "PROVIDER_SYNC_PACKAGES";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub sync: SynchroniseConfig,
    pub staging: StagingConfig,
}

/// Loads a YAML config file and injects environment values.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    apply_env(&mut config);
    config.warn_on_duplicate_release_plan();
    Ok(config)
}

impl CliConfig {
    /// Whether each update would get two release plans: a fragment plus the plan command.
    pub fn duplicates_release_plan(&self) -> bool {
        self.sync.changelog.writes_fragment() && self.staging.plan.is_some()
    }

    fn warn_on_duplicate_release_plan(&self) {
        if self.duplicates_release_plan() {
            warn!(
                staging_dir = %self.sync.changelog.staging_dir.display(),
                "Fragments and a release-plan command are both enabled; every update gets two plans"
            );
        }
    }
}

/// Load `path` when given; otherwise start from the defaults. Environment values are
/// injected either way.
pub fn load_or_default(path: Option<&Path>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => {
            info!("No config file given; using defaults");
            let mut config = CliConfig::default();
            apply_env(&mut config);
            Ok(config)
        }
    }
}

/// Inject `GITHUB_TOKEN`, `GITHUB_OUTPUT` and `PROVIDER_SYNC_PACKAGES`. Empty values
/// count as unset.
pub fn apply_env(config: &mut CliConfig) {
    if let Some(token) = non_empty_var(TOKEN_ENV) {
        debug!("Release feed token injected from environment");
        config.sync.releases.token = Some(token);
    }
    if let Some(output) = non_empty_var(OUTPUT_ENV) {
        debug!(output_file = %output, "Step-output file injected from environment");
        config.staging.output_file = Some(PathBuf::from(output));
    }
    if let Some(root) = non_empty_var(PACKAGES_ENV) {
        debug!(packages_root = %root, "Packages root overridden from environment");
        config.sync.packages_root = PathBuf::from(root);
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
