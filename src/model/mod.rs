use thiserror::Error;

pub mod lock;
pub mod manifest;
pub mod package;
pub mod version;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading configuration toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Missing TOML key `{0}` while parsing")]
    MissingKey(String),
    #[error("Invalid version `{0}`")]
    InvalidVersion(String),
    #[error("Invalid version range `{0}`")]
    InvalidVersionRange(String),
    #[error("Invalid instruction reference `{0}`, expected `package:id`")]
    InvalidInstructionReference(String),
    #[error("Malformed scope pattern `{pattern}`: {source}")]
    MalformedScopePattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("Duplicate instruction id `{0}` within package `{1}`")]
    DuplicateInstructionId(String, String),
    #[error("Unsupported lock file version: {0}")]
    UnsupportedLockFileVersion(toml::Value),
    #[error("Lock file has no version field")]
    MissingLockFileVersion,
}
