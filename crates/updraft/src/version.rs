//! Semantic versioning support for update comparisons.
//!
//! Accepts the loose forms that release tooling tends to produce ("v1.2.3",
//! "1.2", " 2.0.0-rc.1 ") and normalises them to a full `major.minor.patch`
//! before handing off to [`semver`].

use std::cmp::Ordering;

use semver::Version;

use crate::error::{Result, UpdateError};

/// Parse a version string, tolerating a `v` prefix and missing minor/patch.
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let raw = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if raw.is_empty() {
        return Err(UpdateError::InvalidVersion(input.to_string()));
    }

    // Split off pre-release / build suffix before padding the numeric core.
    let suffix_at = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(suffix_at);

    let segments: Vec<&str> = core.split('.').collect();
    if segments.is_empty() || segments.len() > 3 {
        return Err(UpdateError::InvalidVersion(input.to_string()));
    }
    if segments
        .iter()
        .any(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(UpdateError::InvalidVersion(input.to_string()));
    }

    let mut padded = segments.join(".");
    for _ in segments.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Version::parse(&padded).map_err(|_| UpdateError::InvalidVersion(input.to_string()))
}

/// Compare two versions by semantic-version precedence.
///
/// Build metadata does not participate.
#[must_use]
pub fn compare_precedence(a: &Version, b: &Version) -> Ordering {
    a.major
        .cmp(&b.major)
        .then_with(|| a.minor.cmp(&b.minor))
        .then_with(|| a.patch.cmp(&b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

/// Returns true iff `remote` has strictly higher precedence than `local`.
#[must_use]
pub fn is_newer(remote: &Version, local: &Version) -> bool {
    compare_precedence(remote, local) == Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_stable_version() {
        let v = parse_version("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert!(v.pre.is_empty());
    }

    #[test]
    fn test_parse_with_v_prefix_and_whitespace() {
        let v = parse_version("  v4.5.6\n").unwrap();
        assert_eq!(v.to_string(), "4.5.6");
    }

    #[test]
    fn test_parse_pads_missing_segments() {
        assert_eq!(parse_version("1.2").unwrap().to_string(), "1.2.0");
        assert_eq!(parse_version("7").unwrap().to_string(), "7.0.0");
        assert_eq!(
            parse_version("1.2-beta.1").unwrap().to_string(),
            "1.2.0-beta.1"
        );
    }

    #[test]
    fn test_invalid_versions() {
        for input in ["", "v", "invalid", "1.2.3.4", "1..2", "1.x.3", "-1.0.0"] {
            assert!(parse_version(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn test_ordering() {
        let v = |s: &str| parse_version(s).unwrap();
        assert!(is_newer(&v("1.0.1"), &v("1.0.0")));
        assert!(is_newer(&v("1.10.0"), &v("1.9.9")));
        assert!(is_newer(&v("2.0.0"), &v("1.99.99")));
        assert!(!is_newer(&v("1.0.0"), &v("1.0.0")));
        assert!(!is_newer(&v("0.9.0"), &v("1.0.0")));
    }

    #[test]
    fn test_prerelease_ordering() {
        let v = |s: &str| parse_version(s).unwrap();
        assert!(is_newer(&v("1.0.0"), &v("1.0.0-rc.1")));
        assert!(is_newer(&v("1.0.0-rc.1"), &v("1.0.0-beta.2")));
        assert!(is_newer(&v("1.0.0-beta.10"), &v("1.0.0-beta.2")));
    }

    #[test]
    fn test_build_metadata_ignored() {
        let a = parse_version("1.0.0+build.1").unwrap();
        let b = parse_version("1.0.0+build.2").unwrap();
        assert_eq!(compare_precedence(&a, &b), Ordering::Equal);
        assert!(!is_newer(&b, &a));
    }

    proptest! {
        #[test]
        fn newer_iff_core_tuple_greater(
            a in (0u64..50, 0u64..50, 0u64..50),
            b in (0u64..50, 0u64..50, 0u64..50),
        ) {
            let local = parse_version(&format!("{}.{}.{}", a.0, a.1, a.2)).unwrap();
            let remote = parse_version(&format!("{}.{}.{}", b.0, b.1, b.2)).unwrap();
            prop_assert_eq!(is_newer(&remote, &local), b > a);
        }

        #[test]
        fn never_newer_than_itself(a in (0u64..1000, 0u64..1000, 0u64..1000)) {
            let v = parse_version(&format!("v{}.{}.{}", a.0, a.1, a.2)).unwrap();
            prop_assert!(!is_newer(&v, &v));
        }
    }
}
