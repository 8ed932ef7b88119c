use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Everything one run of the pipeline needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynchroniseConfig {
    /// Directory holding one subdirectory per managed package.
    pub packages_root: PathBuf,
    pub registry: RegistryConfig,
    pub releases: ReleasesConfig,
    pub generator: GeneratorConfig,
    pub changelog: ChangelogConfig,
    /// Resolve versions and report decisions without touching any package.
    pub dry_run: bool,
}

impl Default for SynchroniseConfig {
    fn default() -> Self {
        Self {
            packages_root: PathBuf::from("packages"),
            registry: RegistryConfig::default(),
            releases: ReleasesConfig::default(),
            generator: GeneratorConfig::default(),
            changelog: ChangelogConfig::default(),
            dry_run: false,
        }
    }
}

impl SynchroniseConfig {
    pub fn trace_loaded(&self) {
        info!(
            packages_root = %self.packages_root.display(),
            generator_enabled = self.generator.enabled,
            changelog_mode = ?self.changelog.mode,
            dry_run = self.dry_run,
            release_token = self.releases.token.is_some(),
            "Loaded SynchroniseConfig"
        );
        debug!(registry = ?self.registry, generator = ?self.generator, "SynchroniseConfig (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL serving `/v1/providers/{namespace}/{name}/versions`.
    pub versions_url: String,
    /// Base URL serving `/v1/providers/{namespace}/{name}` with a `source` field.
    pub metadata_url: String,
    pub http_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            versions_url: "https://registry.opentofu.org".into(),
            metadata_url: "https://registry.terraform.io".into(),
            http_timeout_secs: 30,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleasesConfig {
    pub api_url: String,
    /// Optional bearer token; only ever injected from the environment.
    #[serde(skip)]
    pub token: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".into(),
            token: None,
            http_timeout_secs: 30,
        }
    }
}

impl ReleasesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// Keeps the token out of debug logs.
impl std::fmt::Debug for ReleasesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasesConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

/// An external command. Arguments may contain `{namespace}`, `{name}`, `{version}`
/// and `{url}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// When false, an update only re-pins the manifest.
    pub enabled: bool,
    pub scaffold: CommandSpec,
    pub generate: CommandSpec,
    /// Subdirectory of the workspace holding one directory per generated package.
    pub candidates_dir: PathBuf,
    /// Parent of the temporary workspaces; the system temp dir when unset.
    pub workspace_parent: Option<PathBuf>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scaffold: CommandSpec::new(
                "pulumi",
                &[
                    "new",
                    "typescript",
                    "--yes",
                    "--force",
                    "--generate-only",
                    "--name",
                    "provider-sync-scratch",
                ],
            ),
            generate: CommandSpec::new(
                "pulumi",
                &[
                    "package",
                    "add",
                    "terraform-provider",
                    "{namespace}/{name}",
                    "{version}",
                ],
            ),
            candidates_dir: PathBuf::from("sdks"),
            workspace_parent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangelogMode {
    /// Prepend an entry to the package's own `CHANGELOG.md`.
    Changelog,
    /// Write a standalone release-note fragment into the staging directory.
    #[default]
    Fragment,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogConfig {
    pub mode: ChangelogMode,
    pub staging_dir: PathBuf,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            mode: ChangelogMode::default(),
            staging_dir: PathBuf::from(".nx/version-plans"),
        }
    }
}

impl ChangelogConfig {
    pub fn writes_changelog(&self) -> bool {
        matches!(self.mode, ChangelogMode::Changelog | ChangelogMode::Both)
    }

    pub fn writes_fragment(&self) -> bool {
        matches!(self.mode, ChangelogMode::Fragment | ChangelogMode::Both)
    }
}
