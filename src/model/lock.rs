use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::ParseError;

use super::{package::PackageName, version::SemanticVersion};

/// Pinned resolution result (`agentpack.lock`). Packages are kept sorted by
/// name so the file is byte-reproducible for a given resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LockFile {
    pub packages: Vec<LockedPackage>,
}

const VERSION: i64 = 1;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct VersionedLockFile<'a> {
    pub version: i64,
    #[serde(flatten)]
    pub content: &'a LockFile,
}

impl LockFile {
    pub fn new(mut packages: Vec<LockedPackage>) -> LockFile {
        packages.sort();
        LockFile { packages }
    }

    pub fn from_file(file: &Path) -> Result<LockFile, ParseError> {
        LockFile::from_str(&std::fs::read_to_string(file)?)
    }

    pub fn from_str(s: &str) -> Result<LockFile, ParseError> {
        let mut table = toml::from_str::<toml::Table>(s)?;
        match table.remove("version") {
            Some(toml::Value::Integer(VERSION)) => table.try_into::<LockFile>().map_err(Into::into),
            Some(other) => Err(ParseError::UnsupportedLockFileVersion(other)),
            None => Err(ParseError::MissingLockFileVersion),
        }
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&VersionedLockFile {
            version: VERSION,
            content: self,
        })
    }

    pub fn get(&self, name: &PackageName) -> Option<&LockedPackage> {
        self.packages.iter().find(|package| &package.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
pub struct LockedPackage {
    pub name: PackageName,
    pub version: SemanticVersion,
}
