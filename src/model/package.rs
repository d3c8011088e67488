use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    path::Path,
    str::FromStr,
};

use globset::{GlobBuilder, GlobMatcher};
use log::{debug, error};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::{version::SemanticVersion, version::VersionRange, ParseError};

#[derive(Clone, Hash, Deserialize, Serialize, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(s: String) -> Self {
        PackageName(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        PackageName(s)
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        PackageName(s.to_string())
    }
}

/// Instruction id, unique within its owning package.
#[derive(Clone, Hash, Deserialize, Serialize, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct InstructionId(String);

impl InstructionId {
    pub fn new(s: String) -> Self {
        InstructionId(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstructionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstructionId {
    fn from(s: &str) -> Self {
        InstructionId(s.to_string())
    }
}

/// Globally unique instruction reference, written `package:id`. Override
/// declarations use this form; a bare id would be ambiguous across packages.
#[derive(Clone, Hash, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct QualifiedId {
    pub package: PackageName,
    pub id: InstructionId,
}

impl QualifiedId {
    pub fn new(package: PackageName, id: InstructionId) -> Self {
        QualifiedId { package, id }
    }
}

impl Display for QualifiedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.package, self.id)
    }
}

impl FromStr for QualifiedId {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            Some((package, id)) if !package.is_empty() && !id.is_empty() => Ok(QualifiedId {
                package: PackageName::from(package),
                id: InstructionId::from(id),
            }),
            _ => Err(ParseError::InvalidInstructionReference(value.to_string())),
        }
    }
}

impl Serialize for QualifiedId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QualifiedId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A path glob restricting where an instruction applies, compiled once at
/// parse time. Matching runs against paths relative to the target tree root;
/// a pattern without a separator also matches by bare file name, so `*.md`
/// applies wherever markdown files live.
#[derive(Debug, Clone)]
pub struct ScopePattern {
    source: String,
    matcher: GlobMatcher,
}

impl ScopePattern {
    pub fn parse(pattern: &str) -> Result<ScopePattern, ParseError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| ParseError::MalformedScopePattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(ScopePattern {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches_file(&self, relative_path: &Path) -> bool {
        if self.matcher.is_match(relative_path) {
            return true;
        }
        if !self.source.contains('/') {
            if let Some(name) = relative_path.file_name() {
                return self.matcher.is_match(Path::new(name));
            }
        }
        false
    }
}

impl PartialEq for ScopePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for ScopePattern {}

impl Display for ScopePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for ScopePattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for ScopePattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        ScopePattern::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// A single unit of agent guidance as declared by its package. Immutable.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InstructionSpec {
    pub id: InstructionId,
    pub text: String,
    pub scope: ScopePattern,
    #[serde(default)]
    pub tier: i32,
    #[serde(default)]
    pub overrides: BTreeSet<QualifiedId>,
}

/// A fetched package: name, version, requirements on other packages, and the
/// instructions it publishes. Immutable once fetched; the registry hands out
/// shared references.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PackageDescriptor {
    pub name: PackageName,
    pub version: SemanticVersion,
    #[serde(default)]
    pub dependencies: BTreeMap<PackageName, VersionRange>,
    #[serde(default)]
    pub instructions: Vec<InstructionSpec>,
}

impl PackageDescriptor {
    pub fn from_file(path: &Path) -> Result<PackageDescriptor, ParseError> {
        debug!(
            "Attempting to read package descriptor from {}",
            path.display()
        );
        let contents = std::fs::read_to_string(path)?;

        let descriptor = PackageDescriptor::from_toml_str(&contents);
        if let Err(err) = &descriptor {
            error!("Could not build a valid package descriptor from {path:?} due to err {err}")
        }
        descriptor
    }

    pub fn from_toml_str(data: &str) -> Result<PackageDescriptor, ParseError> {
        let descriptor: PackageDescriptor = toml::from_str(data)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<(), ParseError> {
        let mut seen = BTreeSet::new();
        for instruction in &self.instructions {
            if !seen.insert(&instruction.id) {
                return Err(ParseError::DuplicateInstructionId(
                    instruction.id.to_string(),
                    self.name.to_string(),
                ));
            }
        }
        Ok(())
    }
}
