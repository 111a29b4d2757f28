//! Release version parsing and ordering.
//!
//! Telemetry and the build registry both describe releases with dotted
//! version strings ("55.0", "55.0.1", "55.0b6", "52.7.0esr"). Ordering
//! rules:
//! - numeric components compare component-wise, missing components are 0
//! - a pre-release suffix (a/b/pre/rc plus an optional number) sorts
//!   before the plain release of the same numeric prefix
//! - pre-releases of the same prefix compare by tag (a < b < pre < rc),
//!   then by number
//! - an "esr" marker is an ordering no-op ("52.7.0esr" == "52.7.0")

use std::cmp::Ordering;

/// Pre-release tag, in ascending release order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreTag {
    Alpha,
    Beta,
    Pre,
    Rc,
}

/// A parsed release version, usable as an ordering key.
///
/// Trailing zero components are normalized away ("55.0" and "55" compare
/// and hash equal), so the raw string should be kept around wherever the
/// original spelling matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    components: Vec<u32>,
    prerelease: Option<(PreTag, u32)>,
}

impl Version {
    /// Parse a dotted version string. Returns None for strings that do
    /// not start with a numeric component or carry an unknown suffix.
    pub fn parse(input: &str) -> Option<Version> {
        let s = input.trim();
        if s.is_empty() {
            return None;
        }

        let mut components = Vec::new();
        let mut prerelease = None;
        for part in s.split('.') {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return None;
            }
            components.push(digits.parse().ok()?);

            let rest = part[digits.len()..].to_ascii_lowercase();
            if rest.is_empty() {
                continue;
            }
            if rest == "esr" {
                break;
            }
            let (tag, tag_len) = if rest.starts_with("pre") {
                (PreTag::Pre, 3)
            } else if rest.starts_with("rc") {
                (PreTag::Rc, 2)
            } else if rest.starts_with('a') {
                (PreTag::Alpha, 1)
            } else if rest.starts_with('b') {
                (PreTag::Beta, 1)
            } else {
                return None;
            };
            let num = &rest[tag_len..];
            let pre_num = if num.is_empty() { 0 } else { num.parse().ok()? };
            prerelease = Some((tag, pre_num));
            break;
        }

        // normalize so "55.0" and "55" are the same key
        while components.len() > 1 && components.last() == Some(&0) {
            components.pop();
        }

        Some(Version {
            components,
            prerelease,
        })
    }

    /// The leading dotted component.
    pub fn major(&self) -> u32 {
        self.components.first().copied().unwrap_or(0)
    }

    /// Whether this is a pre-release (beta, alpha, rc, ...).
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        // same numeric prefix: a release outranks any pre-release
        match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Major version of a raw version string, if parseable.
pub fn major_version(s: &str) -> Option<u32> {
    Version::parse(s).map(|v| v.major())
}

/// Total order over raw version strings for sorting mixed telemetry
/// input. Unparseable strings sort first; equal keys tie-break on the
/// raw spelling so sorts stay deterministic.
pub fn cmp_version_strings(a: &str, b: &str) -> Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}
