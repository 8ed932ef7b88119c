//! Changelog entries and release-note fragments for updated packages.
//!
//! Two strategies are supported. The package's own `CHANGELOG.md` can get a new dated
//! section prepended. Alternatively, a standalone fragment can be written into a shared
//! staging directory for the release tool to pick up. Fragments never conflict when
//! many packages update in one run.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

use crate::error::{Result, SyncError};
use crate::synchronise::UpdateDecision;

pub const CHANGELOG_FILE: &str = "CHANGELOG.md";

/// Insert a `## {version} ({date})` section before the first `##` heading of `existing`.
///
/// Without any heading the entry is appended after a blank line.
pub fn compose_entry(existing: &str, version: &str, text: Option<&str>, date: NaiveDate) -> String {
    let body = text
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Update to version {version}"));
    let entry = format!("## {version} ({})\n\n{body}\n\n", date.format("%Y-%m-%d"));

    static HEADING: OnceLock<Regex> = OnceLock::new();
    let heading = HEADING.get_or_init(|| Regex::new(r"(?m)^##\s").expect("heading pattern is valid"));

    match heading.find(existing) {
        Some(m) => {
            let (head, tail) = existing.split_at(m.start());
            format!("{head}{entry}{tail}")
        }
        None => format!("{existing}\n{entry}"),
    }
}

/// Prepend an entry to `target_dir/CHANGELOG.md`, creating it if needed.
pub fn record_update(
    target_dir: &Path,
    version: &str,
    text: Option<&str>,
    date: NaiveDate,
) -> Result<PathBuf> {
    let path = target_dir.join(CHANGELOG_FILE);
    let existing = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(record_error(&path, e)),
    };

    let updated = compose_entry(&existing, version, text, date);
    fs::write(&path, updated).map_err(|e| record_error(&path, e))?;
    info!(path = %path.display(), version, "[SYNC][RECORD] Updated changelog");
    Ok(path)
}

/// Lowercase, with every run of non-alphanumerics collapsed to a single `-`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "package".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Release-plan document for one update: front matter naming the package and bump,
/// then a summary line and the upstream notes.
pub fn fragment_body(decision: &UpdateDecision) -> String {
    let mut body = format!(
        "---\n'{}': {}\n---\n\nUpdate {} from {} to {}\n",
        decision.package.replace('\'', "''"),
        decision.bump,
        decision.package,
        decision.old_version,
        decision.new_version
    );
    if let Some(notes) = decision.changelog.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        body.push('\n');
        body.push_str(notes);
        body.push('\n');
    }
    body
}

/// Write a uniquely named fragment for `decision` into `staging_dir`.
pub fn write_fragment(
    staging_dir: &Path,
    decision: &UpdateDecision,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(staging_dir).map_err(|e| record_error(staging_dir, e))?;

    let stem = format!(
        "{}-{}",
        sanitize_name(&decision.package),
        now.format("%Y%m%d%H%M%S")
    );
    let mut path = staging_dir.join(format!("{stem}.md"));
    let mut suffix = 1;
    while path.exists() {
        path = staging_dir.join(format!("{stem}-{suffix}.md"));
        suffix += 1;
    }

    fs::write(&path, fragment_body(decision)).map_err(|e| record_error(&path, e))?;
    info!(path = %path.display(), package = %decision.package, "[SYNC][RECORD] Wrote release-note fragment");
    Ok(path)
}

fn record_error(path: &Path, source: io::Error) -> SyncError {
    SyncError::Record {
        path: path.to_path_buf(),
        source,
    }
}
