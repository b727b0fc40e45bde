//! Registry value write/delete blocking filter.
//!
//! A [`RegistryFilter`] installs an [`InterceptionDispatcher`] on a registry
//! [`Interceptor`](regguard_intercept::Interceptor). Every pre-set-value and
//! pre-delete-value notification is resolved to a full path
//! (`<key path>\<value name>`), checked against the rule matcher, and rejected
//! with access-denied on a match. Anything that cannot be resolved is let
//! through.
//!
//! ```no_run
//! use std::sync::Arc;
//! use regguard_agent::{FilterSettings, RegistryFilter};
//! use regguard_intercept::Registry;
//! use regguard_policy::StringFilters;
//! use regguard_protocol::OperationKind;
//!
//! regguard_agent::init_logging();
//! let registry = Arc::new(Registry::new());
//! let filter = RegistryFilter::install(
//!     registry.clone(),
//!     registry.interceptor().clone(),
//!     FilterSettings::default(),
//!     || {
//!         let filters = StringFilters::new();
//!         filters.add_filter(r"\Config\App\Settings\License", OperationKind::WRITE_FLAG)?;
//!         Ok(filters)
//!     },
//! )?;
//! # drop(filter);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod decision;
pub mod dispatcher;
pub mod lifecycle;
pub mod resolver;
pub mod settings;

#[cfg(test)]
mod test_utils;

pub use decision::DecisionEngine;
pub use dispatcher::{InterceptionDispatcher, Operation};
pub use lifecycle::{InitializationFailure, LifecycleState, RegistryFilter};
pub use resolver::{FullPath, NameResolver, PathBuilder, ResolutionFailure};
pub use settings::{FilterSettings, DEFAULT_ALTITUDE};

/// Initialize logging from `RUST_LOG`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
