use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

static LOOSE_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[vV=\s]*(\d+)(?:\.(\d+))?(?:\.(\d+))?").unwrap());

/// Coerces a possibly-loose version string into a strict semver value.
///
/// Marker files on device come from many origins and are not guaranteed to be
/// strict semver; resolution must stay total, so anything unsalvageable maps
/// to `0.0.0` instead of erroring.
pub fn munge(raw: &str) -> Version {
    let trimmed = raw.trim();
    let stripped = trimmed.trim_start_matches(['v', 'V', '=']);
    if let Ok(version) = Version::parse(stripped) {
        return version;
    }

    if let Some(caps) = LOOSE_VERSION.captures(trimmed) {
        let part = |index: usize| {
            caps.get(index)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0)
        };
        return Version::new(part(1), part(2), part(3));
    }

    Version::new(0, 0, 0)
}
