//! regguard-intercept: the registry host facility the filter plugs into.
//!
//! Provides the contracts a registry filter consumes from its host
//! ([`RegistryHost`] for key name queries and pool allocation,
//! [`Interceptor`] for callback registration) plus [`Registry`], an
//! in-memory configuration store that drives registered callbacks on
//! every mutation.

pub mod host;
pub mod interceptor;
pub mod registry;
pub mod types;

// Re-exports for convenience (flattened imports)
pub use host::RegistryHost;
pub use interceptor::listener::RegistryListener;
pub use interceptor::{Cookie, Interceptor};
pub use registry::{FaultPlan, Registry};
pub use types::*;
