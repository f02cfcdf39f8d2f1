//! Dotted-integer versions.
//!
//! Dependencies report versions as plain integer tuples (`5.0.0`,
//! `1.6.47`, `9.13`). Comparison is lexicographic with the shorter tuple
//! zero-extended, so `5.0` and `5.0.0` are the same version.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A dotted-integer version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u64>);

/// Error returned when parsing an invalid version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version `{0}`, expected dotted integers such as 5.0.0")]
pub struct VersionParseError(pub String);

impl Version {
    /// Create a version from its components.
    ///
    /// An empty component list is treated as `0`.
    pub fn new(mut components: Vec<u64>) -> Self {
        if components.is_empty() {
            components.push(0);
        }
        Version(components)
    }

    /// Parse a dotted version such as `5.2.1`.
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionParseError(s.to_string()));
        }

        trimmed
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map(Version)
            .map_err(|_| VersionParseError(s.to_string()))
    }

    /// The integer components.
    pub fn components(&self) -> &[u64] {
        &self.0
    }

    /// The first component.
    pub fn major(&self) -> u64 {
        self.0[0]
    }

    /// Whether this version satisfies a minimum-version floor.
    pub fn at_least(&self, floor: &Version) -> bool {
        self >= floor
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .0
            .iter()
            .rposition(|&c| c != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.0[..len]
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

impl std::str::FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

impl From<&[u64]> for Version {
    fn from(components: &[u64]) -> Self {
        Version::new(components.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(v("5.2.1").components(), &[5, 2, 1]);
        assert_eq!(v(" 9.13 ").components(), &[9, 13]);
        assert!(Version::parse("").is_err());
        assert!(Version::parse("5..1").is_err());
        assert!(Version::parse("5.x").is_err());
    }

    #[test]
    fn test_floor_exactly_met() {
        assert!(v("5.0.0").at_least(&v("5.0.0")));
    }

    #[test]
    fn test_zero_extension() {
        assert_eq!(v("5.0"), v("5.0.0"));
        assert!(v("5.0").at_least(&v("5.0.0")));
        assert!(!v("5").at_least(&v("5.0.1")));
        assert!(v("6").at_least(&v("5.9.9")));
    }

    #[test]
    fn test_lexicographic_not_numeric_sum() {
        assert!(v("5.10.0") > v("5.9.99"));
        assert!(v("7.0.0") > v("6.4.0"));
        assert!(v("5.2.0") < v("5.2.1"));
    }

    #[test]
    fn test_acceptance_matches_tuple_ordering() {
        let versions = [[4, 9, 9], [5, 0, 0], [5, 0, 1], [5, 1, 0], [6, 0, 0]];
        let floors = [[5, 0, 0], [5, 0, 1], [4, 10, 0]];
        for a in versions {
            for floor in floors {
                let expected = a >= floor;
                assert_eq!(
                    Version::new(a.to_vec()).at_least(&Version::new(floor.to_vec())),
                    expected,
                    "{:?} >= {:?}",
                    a,
                    floor
                );
            }
        }
    }

    #[test]
    fn test_display_roundtrips_components() {
        assert_eq!(v("1.6.47").to_string(), "1.6.47");
    }

    #[test]
    fn test_equal_versions_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("5.0"));
        assert!(set.contains(&v("5.0.0")));
    }
}
