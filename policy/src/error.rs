use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("pattern compilation error: {0}")]
    Pattern(#[from] PatternError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported filter config version: {0} (supported: 1)")]
    UnsupportedVersion(u32),

    #[error("rule '{0}' selects no operations")]
    NoOperations(String),

    #[error("altitude must be a decimal number, got '{0}'")]
    InvalidAltitude(String),
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,

    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PolicyError>;
pub type PatternResult<T> = std::result::Result<T, PatternError>;
