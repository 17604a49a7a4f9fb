use std::cmp::Ordering;

use semver::Version;

/// Parse a chart version, tolerating a leading `v`.
pub fn parse_version(raw: &str) -> Result<Version, semver::Error> {
    Version::parse(raw.strip_prefix('v').unwrap_or(raw))
}

/// Total order on version strings: valid semantic versions by precedence,
/// then unparseable strings lexically, which sort below every valid version.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
