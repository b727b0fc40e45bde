//! Block rules for registry value mutations.
//!
//! This crate provides the [`RuleMatcher`] contract the filter consults,
//! and [`StringFilters`], a concurrent pattern store implementing it, plus
//! YAML loading of rule sets.
//!
//! # Example
//!
//! ```
//! use regguard_policy::{FilterConfig, RuleMatcher};
//! use regguard_protocol::OperationKind;
//!
//! let yaml = r#"
//! version: 1
//! rules:
//!   - pattern: '\REGISTRY\MACHINE\SOFTWARE\Vendor\*\License'
//!     operations: [write]
//! "#;
//!
//! let filters = FilterConfig::from_yaml(yaml).unwrap().build_filters().unwrap();
//!
//! let path = r"\REGISTRY\MACHINE\SOFTWARE\Vendor\App\License";
//! assert!(filters.matches(path, OperationKind::Write));
//! assert!(!filters.matches(path, OperationKind::Delete));
//! ```

mod config;
mod error;
mod filters;
mod matcher;
mod pattern;


// Re-export public types
pub use config::{FilterConfig, RuleConfig};
pub use error::{PatternError, PolicyError, ValidationError};
pub use filters::{Filter, StringFilters};
pub use matcher::RuleMatcher;
pub use pattern::{compile_pattern, CompiledPattern};
