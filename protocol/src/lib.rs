//! Common types shared between the registry host, the rule matcher and the filter agent.

pub mod operation;
pub mod wide;

pub use operation::*;
