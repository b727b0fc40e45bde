//! YAML rule-set configuration.
//!
//! ```yaml
//! version: 1
//! altitude: "385200"
//! rules:
//!   - pattern: '\REGISTRY\MACHINE\SOFTWARE\Vendor\*\License'
//!     operations: [write, delete]
//! ```

use std::path::Path;

use log::info;
use regguard_protocol::OperationKind;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PolicyError, Result, ValidationError};
use crate::filters::StringFilters;
use crate::pattern::compile_pattern;

const SUPPORTED_VERSION: u32 = 1;

/// A parsed filter configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    pub version: u32,
    /// Callback altitude; a YAML number or string.
    #[serde(default, deserialize_with = "deserialize_altitude")]
    pub altitude: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// One block rule. Omitting `operations` blocks both writes and deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub pattern: String,
    #[serde(default = "all_operations")]
    pub operations: Vec<OperationKind>,
}

impl RuleConfig {
    pub fn operation_mask(&self) -> u32 {
        self.operations.iter().fold(0, |mask, op| mask | op.flag())
    }
}

fn all_operations() -> Vec<OperationKind> {
    vec![OperationKind::Write, OperationKind::Delete]
}

fn deserialize_altitude<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "altitude must be a string or number, got {:?}",
            other
        ))),
    }
}

impl FilterConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FilterConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        info!(
            "Loaded {} registry filter rule(s) from {}",
            config.rules.len(),
            path.display()
        );
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.version != SUPPORTED_VERSION {
            return Err(ValidationError::UnsupportedVersion(self.version).into());
        }
        if let Some(altitude) = &self.altitude {
            let valid = match altitude.split_once('.') {
                Some((whole, fraction)) => {
                    is_digits(whole) && fraction.bytes().all(|b| b.is_ascii_digit())
                }
                None => is_digits(altitude),
            };
            if !valid {
                return Err(ValidationError::InvalidAltitude(altitude.clone()).into());
            }
        }
        for rule in &self.rules {
            if rule.operations.is_empty() {
                return Err(ValidationError::NoOperations(rule.pattern.clone()).into());
            }
            compile_pattern(&rule.pattern)?;
        }
        Ok(())
    }

    /// Compile every rule into a fresh [`StringFilters`].
    pub fn build_filters(&self) -> Result<StringFilters> {
        let filters = StringFilters::new();
        for rule in &self.rules {
            filters.add_filter(&rule.pattern, rule.operation_mask())?;
        }
        Ok(filters)
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
