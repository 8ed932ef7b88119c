//! Regenerates a provider package with external tools inside a disposable workspace.
//!
//! The workspace is a [`tempfile::TempDir`]; it is owned by the returned
//! [`GeneratedWorkspace`] on success and dropped (deleted) on every error path, so no
//! generation attempt can leave files behind.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::config::{CommandSpec, GeneratorConfig};
use crate::contract::Generator;
use crate::error::{Result, SyncError};
use crate::provider::MANIFEST_FILE;

/// Output of one successful generation. Dropping it removes the whole workspace.
#[derive(Debug)]
pub struct GeneratedWorkspace {
    dir: TempDir,
    package_dir: PathBuf,
    candidates: Vec<PathBuf>,
}

impl GeneratedWorkspace {
    pub fn new(dir: TempDir, package_dir: PathBuf, candidates: Vec<PathBuf>) -> Self {
        Self {
            dir,
            package_dir,
            candidates,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// The candidate selected as the regenerated package.
    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Delete the workspace now, reporting any error instead of ignoring it on drop.
    pub fn close(self) -> Result<()> {
        let root = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            SyncError::generation("cleanup", format!("failed to remove {}: {e}", root.display()))
        })
    }
}

/// Pick the generated package directory for `provider_name`.
///
/// Returns the first candidate whose manifest `name` contains the provider name or
/// whose `pulumi.name` equals it. When nothing matches, falls back to the first
/// candidate. This is a best-effort heuristic: first match wins and there is no
/// tie-break between several partial matches, so a change in the generator's naming
/// can make it pick the wrong directory.
pub fn select_candidate<'a>(candidates: &'a [PathBuf], provider_name: &str) -> Option<&'a PathBuf> {
    candidates
        .iter()
        .find(|dir| manifest_matches(dir, provider_name))
        .or_else(|| candidates.first())
}

fn manifest_matches(dir: &Path, provider_name: &str) -> bool {
    let Ok(text) = fs::read_to_string(dir.join(MANIFEST_FILE)) else {
        return false;
    };
    let Ok(manifest) = serde_json::from_str::<Value>(&text) else {
        return false;
    };

    let name_matches = manifest
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| n.contains(provider_name));
    let provider_field_matches = manifest
        .get("pulumi")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .is_some_and(|n| n == provider_name);

    name_matches || provider_field_matches
}

/// Runs the configured scaffold and generate commands.
pub struct CommandGenerator {
    config: GeneratorConfig,
}

impl CommandGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("provider-sync-");
        let dir = match &self.config.workspace_parent {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| {
                    SyncError::generation("workspace", format!("cannot create {}: {e}", parent.display()))
                })?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        };
        dir.map_err(|e| SyncError::generation("workspace", format!("cannot create temp dir: {e}")))
    }

    fn list_candidates(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let candidates_root = root.join(&self.config.candidates_dir);
        let entries = fs::read_dir(&candidates_root).map_err(|e| {
            SyncError::generation(
                "discover",
                format!("no generated output at {}: {e}", candidates_root.display()),
            )
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        candidates.sort();
        Ok(candidates)
    }
}

impl Generator for CommandGenerator {
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
        url: &str,
    ) -> Result<GeneratedWorkspace> {
        // Dropped on any `?` below, which removes the directory.
        let workspace = self.create_workspace()?;
        let root = workspace.path();
        info!(
            provider = %format!("{namespace}/{name}"),
            version = %version,
            workspace = %root.display(),
            "[SYNC][GENERATE] Created generation workspace"
        );

        let vars = [
            ("namespace", namespace),
            ("name", name),
            ("version", version),
            ("url", url),
        ];
        run_captured("scaffold", &self.config.scaffold, root, &vars)?;
        run_captured("generate", &self.config.generate, root, &vars)?;

        let candidates = self.list_candidates(root)?;
        let package_dir = select_candidate(&candidates, name).cloned().ok_or_else(|| {
            SyncError::generation(
                "discover",
                format!("generator produced no package under {}", self.config.candidates_dir.display()),
            )
        })?;
        if candidates.len() > 1 {
            warn!(
                count = candidates.len(),
                selected = %package_dir.display(),
                "Generator produced several packages; selection is best effort"
            );
        }

        info!(package_dir = %package_dir.display(), "[SYNC][GENERATE] Generation succeeded");
        Ok(GeneratedWorkspace::new(workspace, package_dir, candidates))
    }
}

fn render_args(spec: &CommandSpec, vars: &[(&str, &str)]) -> Vec<String> {
    spec.args
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        })
        .collect()
}

/// Run a tool in `cwd` with stdin closed and stdout/stderr captured.
fn run_captured(stage: &str, spec: &CommandSpec, cwd: &Path, vars: &[(&str, &str)]) -> Result<()> {
    let args = render_args(spec, vars);
    debug!(stage, program = %spec.program, ?args, "Running external tool");

    let output = Command::new(&spec.program)
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            error!(stage, program = %spec.program, error = ?e, "Failed to launch external tool");
            SyncError::generation(stage, format!("failed to launch {}: {e}", spec.program))
        })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let captured = if stderr.is_empty() { stdout } else { stderr };
    error!(stage, program = %spec.program, status = %output.status, "External tool exited with non-zero status");
    Err(SyncError::Generation {
        stage: stage.to_string(),
        message: format!("{} exited with {}", spec.program, output.status),
        output: (!captured.is_empty()).then_some(captured),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn candidate(root: &Path, dir: &str, manifest: &str) -> PathBuf {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MANIFEST_FILE), manifest).unwrap();
        path
    }

    #[test]
    fn selects_candidate_by_manifest_name() {
        let root = tempdir().unwrap();
        let a = candidate(root.path(), "a", r#"{"name":"@scratch/other"}"#);
        let b = candidate(root.path(), "b", r#"{"name":"@acme/widget"}"#);
        let candidates = vec![a, b.clone()];
        assert_eq!(select_candidate(&candidates, "widget"), Some(&b));
    }

    #[test]
    fn selects_candidate_by_provider_field() {
        let root = tempdir().unwrap();
        let a = candidate(root.path(), "a", r#"{"name":"@scratch/other"}"#);
        let b = candidate(root.path(), "b", r#"{"name":"sdk","pulumi":{"name":"widget"}}"#);
        let candidates = vec![a, b.clone()];
        assert_eq!(select_candidate(&candidates, "widget"), Some(&b));
    }

    #[test]
    fn first_match_wins_and_falls_back_to_first() {
        let root = tempdir().unwrap();
        let a = candidate(root.path(), "a", r#"{"name":"widget-a"}"#);
        let b = candidate(root.path(), "b", r#"{"name":"widget-b"}"#);
        let c = root.path().join("c");
        fs::create_dir_all(&c).unwrap();

        let both = vec![a.clone(), b];
        assert_eq!(select_candidate(&both, "widget"), Some(&a));

        let none_match = vec![c.clone(), a];
        assert_eq!(select_candidate(&none_match, "gadget"), Some(&c));

        assert_eq!(select_candidate(&[], "widget"), None);
    }

    #[test]
    fn renders_placeholders() {
        let spec = CommandSpec::new("tool", &["add", "{namespace}/{name}", "{version}", "--src={url}"]);
        let args = render_args(
            &spec,
            &[("namespace", "acme"), ("name", "widget"), ("version", "1.1.0"), ("url", "r/acme/widget")],
        );
        assert_eq!(args, vec!["add", "acme/widget", "1.1.0", "--src=r/acme/widget"]);
    }
}
