//! Allow/deny decisions over resolved names.

use std::sync::Arc;

use log::debug;
use regguard_policy::RuleMatcher;
use regguard_protocol::{OperationKind, Verdict};

use crate::resolver::{FullPath, ResolutionFailure};

/// Turns a resolution result into a [`Verdict`].
///
/// Resolution failures always allow: they are infrastructure faults, and
/// failing closed on them would block every mutation of that shape.
pub struct DecisionEngine<M: ?Sized> {
    matcher: Arc<M>,
}

impl<M: RuleMatcher + ?Sized> DecisionEngine<M> {
    pub fn new(matcher: Arc<M>) -> Self {
        Self { matcher }
    }

    /// `Deny` iff the name resolved and the matcher blocks it for `operation`.
    pub fn decide(
        &self,
        operation: OperationKind,
        resolution: &Result<FullPath, ResolutionFailure>,
    ) -> Verdict {
        match resolution {
            Ok(path) => {
                if self.matcher.matches(&path.to_string_lossy(), operation) {
                    Verdict::Deny
                } else {
                    Verdict::Allow
                }
            }
            Err(failure) => {
                debug!(
                    "Allowing {} after resolution failure ({}): {}",
                    operation,
                    failure.kind(),
                    failure
                );
                Verdict::Allow
            }
        }
    }
}
