//! Three-component version comparison used to decide whether a package is stale.
//!
//! This is deliberately not semver: versions like `1.2` or `v3` are accepted, missing
//! components count as zero and pre-release suffixes are ignored.

use serde::Serialize;
use std::fmt;

/// Magnitude of a version change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BumpKind::Major => "major",
            BumpKind::Minor => "minor",
            BumpKind::Patch => "patch",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    /// Raw string equality of the two inputs. When true no update is attempted.
    pub equal: bool,
    pub bump: BumpKind,
}

/// Compare the pinned version against the upstream one.
///
/// `equal` is decided on the raw strings before any parsing, so `1.0` and `1.0.0`
/// are considered different and classified as a patch bump.
pub fn compare(old: &str, new: &str) -> Comparison {
    let equal = old == new;
    let (old_major, old_minor, _) = parse_components(old);
    let (new_major, new_minor, _) = parse_components(new);

    let bump = if new_major > old_major {
        BumpKind::Major
    } else if new_minor > old_minor {
        BumpKind::Minor
    } else {
        BumpKind::Patch
    };

    Comparison { equal, bump }
}

/// Parse `[v]MAJOR[.MINOR[.PATCH]]`, reading only the leading digits of each part.
pub fn parse_components(version: &str) -> (u64, u64, u64) {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let mut parts = trimmed.split('.').map(leading_number);
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

fn leading_number(part: &str) -> u64 {
    let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn classifies_bumps() {
        assert_eq!(compare("1.2.3", "2.0.0").bump, BumpKind::Major);
        assert_eq!(compare("1.2.3", "1.3.0").bump, BumpKind::Minor);
        assert_eq!(compare("1.2.3", "1.2.4").bump, BumpKind::Patch);
        assert!(compare("1.2.3", "1.2.3").equal);
        assert!(!compare("1.2.3", "1.2.4").equal);
    }

    #[test]
    fn missing_components_default_to_zero() {
        assert_eq!(parse_components("2"), (2, 0, 0));
        assert_eq!(parse_components("v1.4"), (1, 4, 0));
        assert_eq!(parse_components("1.2.3-beta.1"), (1, 2, 3));
        assert_eq!(parse_components("garbage"), (0, 0, 0));
    }

    #[test]
    fn textually_different_but_numerically_equal_is_patch() {
        let c = compare("1.0", "1.0.0");
        assert!(!c.equal);
        assert_eq!(c.bump, BumpKind::Patch);

        let c = compare("v1.2.3", "1.2.3");
        assert!(!c.equal);
        assert_eq!(c.bump, BumpKind::Patch);
    }

    #[test]
    fn classification_only_looks_for_increases() {
        // A lower major does not block the minor rule.
        assert_eq!(compare("2.1.0", "1.5.0").bump, BumpKind::Minor);
        assert_eq!(compare("1.5.0", "1.2.9").bump, BumpKind::Patch);
    }

    proptest! {
        #[test]
        fn equal_components_never_update(a in 0u32..500, b in 0u32..500, c in 0u32..500) {
            let v = format!("{a}.{b}.{c}");
            prop_assert!(compare(&v, &v).equal);
        }

        #[test]
        fn leading_component_increase_is_major(
            a in 0u32..500, b in 0u32..500, c in 0u32..500,
            step in 1u32..10, nb in 0u32..500, nc in 0u32..500,
        ) {
            let old = format!("{a}.{b}.{c}");
            let new = format!("{}.{nb}.{nc}", a + step);
            prop_assert_eq!(compare(&old, &new).bump, BumpKind::Major);
        }

        #[test]
        fn second_component_increase_is_minor(
            a in 0u32..500, b in 0u32..500, c in 0u32..500,
            step in 1u32..10, nc in 0u32..500,
        ) {
            let old = format!("{a}.{b}.{c}");
            let new = format!("{a}.{}.{nc}", b + step);
            prop_assert_eq!(compare(&old, &new).bump, BumpKind::Minor);
        }
    }
}
