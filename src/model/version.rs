use std::{
    cmp::Ordering,
    fmt::{Debug, Display},
    str::FromStr,
};

use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::ParseError;

/// A `major.minor.patch` version. Pre-release and build metadata are not
/// supported: published context packages carry plain three-component versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> SemanticVersion {
        SemanticVersion {
            major,
            minor,
            patch,
        }
    }

    /// The smallest version that is no longer compatible with `self` in the
    /// caret sense: `^1.2.3` admits everything below `2.0.0`, `^0.2.3`
    /// everything below `0.3.0`, and `^0.0.3` only `0.0.3` itself.
    fn caret_upper(&self) -> SemanticVersion {
        if self.major > 0 {
            SemanticVersion::new(self.major + 1, 0, 0)
        } else if self.minor > 0 {
            SemanticVersion::new(0, self.minor + 1, 0)
        } else {
            SemanticVersion::new(0, 0, self.patch + 1)
        }
    }
}

impl FromStr for SemanticVersion {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let re: Regex = Regex::new(r"^(?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)$").unwrap();
        let captures = re
            .captures(value.trim())
            .ok_or_else(|| ParseError::InvalidVersion(value.to_string()))?;

        let part = |name: &str| -> Result<u64, ParseError> {
            captures
                .name(name)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| ParseError::InvalidVersion(value.to_string()))
        };

        Ok(SemanticVersion {
            major: part("major")?,
            minor: part("minor")?,
            patch: part("patch")?,
        })
    }
}

impl Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// One end of a version interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Unbounded,
    Inclusive(SemanticVersion),
    Exclusive(SemanticVersion),
}

/// A contiguous interval over versions, the predicate form every declared
/// requirement is normalized into. Intersection of two ranges is again a
/// range, possibly an empty one (`is_empty`), which is the well-defined
/// "no version satisfies" outcome the resolver reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    lower: Bound,
    upper: Bound,
}

impl VersionRange {
    pub fn any() -> VersionRange {
        VersionRange {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    pub fn exact(version: SemanticVersion) -> VersionRange {
        VersionRange {
            lower: Bound::Inclusive(version),
            upper: Bound::Inclusive(version),
        }
    }

    pub fn at_least(version: SemanticVersion) -> VersionRange {
        VersionRange {
            lower: Bound::Inclusive(version),
            upper: Bound::Unbounded,
        }
    }

    pub fn below(version: SemanticVersion) -> VersionRange {
        VersionRange {
            lower: Bound::Unbounded,
            upper: Bound::Exclusive(version),
        }
    }

    /// Caret range: at least `version`, below the next incompatible release.
    pub fn compatible(version: SemanticVersion) -> VersionRange {
        VersionRange {
            lower: Bound::Inclusive(version),
            upper: Bound::Exclusive(version.caret_upper()),
        }
    }

    pub fn matches(&self, version: &SemanticVersion) -> bool {
        let above_lower = match self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(l) => *version >= l,
            Bound::Exclusive(l) => *version > l,
        };
        let below_upper = match self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(u) => *version <= u,
            Bound::Exclusive(u) => *version < u,
        };
        above_lower && below_upper
    }

    pub fn intersect(&self, other: &VersionRange) -> VersionRange {
        VersionRange {
            lower: tighter_lower(self.lower, other.lower),
            upper: tighter_upper(self.upper, other.upper),
        }
    }

    /// True when no version at all can satisfy the range.
    pub fn is_empty(&self) -> bool {
        match (self.lower, self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
            (Bound::Inclusive(l), Bound::Inclusive(u)) => l > u,
            (Bound::Inclusive(l), Bound::Exclusive(u))
            | (Bound::Exclusive(l), Bound::Inclusive(u))
            | (Bound::Exclusive(l), Bound::Exclusive(u)) => l >= u,
        }
    }
}

fn tighter_lower(a: Bound, b: Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Inclusive(x), Bound::Inclusive(y)) => Bound::Inclusive(x.max(y)),
        (Bound::Exclusive(x), Bound::Exclusive(y)) => Bound::Exclusive(x.max(y)),
        (Bound::Inclusive(x), Bound::Exclusive(y)) | (Bound::Exclusive(y), Bound::Inclusive(x)) => {
            // At an equal version the exclusive bound is the stricter one.
            match x.cmp(&y) {
                Ordering::Greater => Bound::Inclusive(x),
                _ => Bound::Exclusive(y),
            }
        }
    }
}

fn tighter_upper(a: Bound, b: Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Inclusive(x), Bound::Inclusive(y)) => Bound::Inclusive(x.min(y)),
        (Bound::Exclusive(x), Bound::Exclusive(y)) => Bound::Exclusive(x.min(y)),
        (Bound::Inclusive(x), Bound::Exclusive(y)) | (Bound::Exclusive(y), Bound::Inclusive(x)) => {
            match x.cmp(&y) {
                Ordering::Less => Bound::Inclusive(x),
                _ => Bound::Exclusive(y),
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = ParseError;

    /// Accepts `*`, `=X.Y.Z`, `>=X.Y.Z`, `>X.Y.Z`, `<X.Y.Z`, `<=X.Y.Z`,
    /// `^X.Y.Z`, a bare version (treated as a caret range), and
    /// comma-separated conjunctions of the above.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut range = VersionRange::any();
        for part in value.split(',') {
            range = range.intersect(&parse_single_range(part.trim(), value)?);
        }
        Ok(range)
    }
}

fn parse_single_range(part: &str, whole: &str) -> Result<VersionRange, ParseError> {
    let invalid = || ParseError::InvalidVersionRange(whole.to_string());
    if part == "*" {
        return Ok(VersionRange::any());
    }
    let parse = |rest: &str| -> Result<SemanticVersion, ParseError> {
        rest.trim().parse().map_err(|_| invalid())
    };
    if let Some(rest) = part.strip_prefix(">=") {
        Ok(VersionRange::at_least(parse(rest)?))
    } else if let Some(rest) = part.strip_prefix("<=") {
        Ok(VersionRange {
            lower: Bound::Unbounded,
            upper: Bound::Inclusive(parse(rest)?),
        })
    } else if let Some(rest) = part.strip_prefix('>') {
        Ok(VersionRange {
            lower: Bound::Exclusive(parse(rest)?),
            upper: Bound::Unbounded,
        })
    } else if let Some(rest) = part.strip_prefix('<') {
        Ok(VersionRange::below(parse(rest)?))
    } else if let Some(rest) = part.strip_prefix('^') {
        Ok(VersionRange::compatible(parse(rest)?))
    } else if let Some(rest) = part.strip_prefix('=') {
        Ok(VersionRange::exact(parse(rest)?))
    } else if part.is_empty() {
        Err(invalid())
    } else {
        Ok(VersionRange::compatible(parse(part)?))
    }
}

impl Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.lower, self.upper) {
            (Bound::Unbounded, Bound::Unbounded) => f.write_str("*"),
            (Bound::Inclusive(l), Bound::Inclusive(u)) if l == u => write!(f, "={l}"),
            (lower, upper) => {
                let mut parts = Vec::new();
                match lower {
                    Bound::Unbounded => {}
                    Bound::Inclusive(l) => parts.push(format!(">={l}")),
                    Bound::Exclusive(l) => parts.push(format!(">{l}")),
                }
                match upper {
                    Bound::Unbounded => {}
                    Bound::Inclusive(u) => parts.push(format!("<={u}")),
                    Bound::Exclusive(u) => parts.push(format!("<{u}")),
                }
                f.write_str(&parts.join(", "))
            }
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
