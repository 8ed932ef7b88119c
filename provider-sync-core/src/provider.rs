//! Managed packages and the provider reference embedded in their manifest.
//!
//! Every package directory under the packages root carries a `package.json` whose
//! `pulumi.parameterization.value` is a base64-encoded JSON blob of the form
//! `{"remote":{"url":"registry.opentofu.org/<namespace>/<name>","version":"1.2.3"}}`.
//! This module decodes that blob into a [`ProviderReference`], discovers packages, and
//! re-pins a manifest to a new version.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

pub const MANIFEST_FILE: &str = "package.json";

/// Key path of the encoded provider reference inside the manifest.
pub const PARAMETERIZATION_PATH: &[&str] = &["pulumi", "parameterization"];

/// Upstream provider a package wraps, at its pinned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReference {
    pub namespace: String,
    pub name: String,
    pub url: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedParameterization {
    remote: RemoteProvider,
}

#[derive(Debug, Serialize, Deserialize)]
struct RemoteProvider {
    url: String,
    version: String,
}

impl ProviderReference {
    /// Build a reference from a registry URL; the last two path segments are the
    /// namespace and provider name.
    pub fn from_url(url: &str, version: &str) -> Result<Self> {
        let segments: Vec<&str> = url
            .trim()
            .trim_end_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(SyncError::InvalidReference(format!(
                "provider url '{url}' needs at least two path segments"
            )));
        }
        let name = segments[segments.len() - 1];
        let namespace = segments[segments.len() - 2];
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            version: version.to_string(),
        })
    }

    pub fn decode(value: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(value.trim())
            .map_err(|e| SyncError::InvalidReference(format!("not base64: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|e| SyncError::InvalidReference(format!("not utf-8: {e}")))?;
        let decoded: EncodedParameterization = serde_json::from_str(&text)
            .map_err(|e| SyncError::InvalidReference(format!("unexpected payload: {e}")))?;
        Self::from_url(&decoded.remote.url, &decoded.remote.version)
    }

    pub fn encode(&self) -> String {
        let payload = EncodedParameterization {
            remote: RemoteProvider {
                url: self.url.clone(),
                version: self.version.clone(),
            },
        };
        // Serialising two plain strings cannot fail.
        let text = serde_json::to_string(&payload).unwrap_or_default();
        STANDARD.encode(text)
    }

    pub fn with_version(&self, version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..self.clone()
        }
    }

    /// `namespace/name`, as shown in logs.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A package directory with a decoded provider reference.
#[derive(Debug, Clone)]
pub struct ManagedPackage {
    pub path: PathBuf,
    pub name: String,
    pub provider: ProviderReference,
}

impl ManagedPackage {
    /// Load a package from its directory.
    ///
    /// Fails with `NotFound` when the manifest carries no parameterization and with
    /// `InvalidReference` when it cannot be read or decoded. Both are skips.
    pub fn load(path: &Path) -> Result<Self> {
        let manifest_path = path.join(MANIFEST_FILE);
        let manifest = read_manifest(&manifest_path).map_err(|e| {
            SyncError::InvalidReference(format!("cannot read {}: {e}", manifest_path.display()))
        })?;

        let dir_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(dir_name);

        let encoded = lookup(&manifest, PARAMETERIZATION_PATH)
            .and_then(|p| p.get("value"))
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::NotFound(format!("{name}: no parameterization found")))?;

        let provider = ProviderReference::decode(encoded)?;
        Ok(Self {
            path: path.to_path_buf(),
            name,
            provider,
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }
}

/// List package directories under `root` that contain a manifest, sorted by name.
pub fn discover_packages(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(root).map_err(|e| {
        SyncError::Config(format!(
            "cannot read packages root {}: {e}",
            root.display()
        ))
    })?;

    let mut packages: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join(MANIFEST_FILE).is_file())
        .collect();
    packages.sort();

    info!(root = %root.display(), count = packages.len(), "[SYNC] Discovered packages");
    Ok(packages)
}

/// Rewrite the manifest's parameterization so it pins `reference`.
///
/// Returns `false` without touching the file when it already pins that version.
pub fn pin_manifest(manifest_path: &Path, reference: &ProviderReference) -> Result<bool> {
    let merge_err = |source: std::io::Error| SyncError::Merge {
        path: manifest_path.to_path_buf(),
        source,
    };
    let mut manifest = read_manifest(manifest_path).map_err(merge_err)?;

    let current = lookup(&manifest, PARAMETERIZATION_PATH)
        .and_then(|p| p.get("value"))
        .and_then(Value::as_str)
        .and_then(|v| ProviderReference::decode(v).ok());
    if current.as_ref() == Some(reference) {
        debug!(manifest = %manifest_path.display(), "Manifest already pins the target version");
        return Ok(false);
    }

    let slot = lookup_mut(&mut manifest, PARAMETERIZATION_PATH);
    if !slot.is_object() {
        *slot = json!({});
    }
    if let Value::Object(map) = slot {
        map.insert("value".into(), Value::String(reference.encode()));
        map.insert("version".into(), Value::String(reference.version.clone()));
    }

    write_manifest(manifest_path, &manifest).map_err(merge_err)?;
    info!(
        manifest = %manifest_path.display(),
        version = %reference.version,
        "[SYNC] Pinned provider version in manifest"
    );
    Ok(true)
}

pub(crate) fn read_manifest(path: &Path) -> std::io::Result<Value> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Write JSON with two-space indentation and a trailing newline, the way npm does.
pub(crate) fn write_manifest(path: &Path, manifest: &Value) -> std::io::Result<()> {
    let mut text = serde_json::to_string_pretty(manifest)?;
    text.push('\n');
    fs::write(path, text)
}

pub(crate) fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Walk `path`, replacing any non-object on the way with an empty object.
pub(crate) fn lookup_mut<'a>(value: &'a mut Value, path: &[&str]) -> &'a mut Value {
    path.iter().fold(value, |current, key| {
        if !current.is_object() {
            *current = json!({});
        }
        match current {
            Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn manifest_with(reference: &ProviderReference) -> Value {
        json!({
            "name": "@acme/widget",
            "scripts": { "build": "tsc" },
            "pulumi": {
                "resource": true,
                "parameterization": {
                    "name": reference.name,
                    "version": reference.version,
                    "value": reference.encode(),
                }
            }
        })
    }

    #[test]
    fn from_url_takes_last_two_segments() {
        let r = ProviderReference::from_url("registry.opentofu.org/acme/widget", "1.0.0").unwrap();
        assert_eq!(r.namespace, "acme");
        assert_eq!(r.name, "widget");
        assert_eq!(r.slug(), "acme/widget");
    }

    #[test]
    fn from_url_rejects_single_segment() {
        let err = ProviderReference::from_url("widget", "1.0.0").unwrap_err();
        assert!(matches!(err, SyncError::InvalidReference(_)));
        assert!(ProviderReference::from_url("", "1.0.0").is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(ProviderReference::decode("%%%").is_err());
        let not_json = STANDARD.encode("hello");
        assert!(ProviderReference::decode(&not_json).is_err());
    }

    #[test]
    fn load_reads_name_and_reference() {
        let dir = tempdir().unwrap();
        let reference =
            ProviderReference::from_url("registry.opentofu.org/acme/widget", "1.0.0").unwrap();
        write_manifest(&dir.path().join(MANIFEST_FILE), &manifest_with(&reference)).unwrap();

        let pkg = ManagedPackage::load(dir.path()).unwrap();
        assert_eq!(pkg.name, "@acme/widget");
        assert_eq!(pkg.provider, reference);
    }

    #[test]
    fn load_without_parameterization_is_not_found() {
        let dir = tempdir().unwrap();
        write_manifest(&dir.path().join(MANIFEST_FILE), &json!({ "name": "plain" })).unwrap();
        let err = ManagedPackage::load(dir.path()).unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn discover_skips_dirs_without_manifest_and_sorts() {
        let root = tempdir().unwrap();
        for name in ["zeta", "alpha", "no-manifest"] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("zeta").join(MANIFEST_FILE), "{}").unwrap();
        fs::write(root.path().join("alpha").join(MANIFEST_FILE), "{}").unwrap();
        fs::write(root.path().join("stray-file"), "x").unwrap();

        let found = discover_packages(root.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn lookup_mut_replaces_scalars_on_the_path() {
        let mut manifest = json!({ "name": "x", "pulumi": "not-an-object" });
        *lookup_mut(&mut manifest, PARAMETERIZATION_PATH) = json!({ "version": "1.0.0" });
        assert_eq!(manifest["name"], "x");
        assert_eq!(manifest["pulumi"]["parameterization"]["version"], "1.0.0");

        let mut scalar = json!(3);
        *lookup_mut(&mut scalar, &["a"]) = json!(true);
        assert_eq!(scalar, json!({ "a": true }));
    }

    #[test]
    fn pin_manifest_rewrites_only_parameterization() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let old = ProviderReference::from_url("registry.opentofu.org/acme/widget", "1.0.0").unwrap();
        write_manifest(&path, &manifest_with(&old)).unwrap();

        let new = old.with_version("1.1.0");
        assert!(pin_manifest(&path, &new).unwrap());
        assert!(!pin_manifest(&path, &new).unwrap());

        let manifest = read_manifest(&path).unwrap();
        assert_eq!(manifest["scripts"]["build"], "tsc");
        assert_eq!(manifest["pulumi"]["resource"], true);
        assert_eq!(manifest["pulumi"]["parameterization"]["version"], "1.1.0");
        let pinned = ManagedPackage::load(dir.path()).unwrap();
        assert_eq!(pinned.provider.version, "1.1.0");
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(
            host in "[a-z]{1,10}\\.[a-z]{2,3}",
            namespace in "[a-z0-9-]{1,12}",
            name in "[a-z0-9_-]{1,12}",
            version in "[0-9]{1,3}\\.[0-9]{1,3}\\.[0-9]{1,3}",
        ) {
            let url = format!("{host}/{namespace}/{name}");
            let original = ProviderReference::from_url(&url, &version).unwrap();
            let decoded = ProviderReference::decode(&original.encode()).unwrap();
            prop_assert_eq!(decoded, original);
        }
    }
}
