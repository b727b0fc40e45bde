//! Mutation kinds, verdicts and the status handed back to the host.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which value mutation is being attempted.
///
/// Derived solely from the notification class that fired; never from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Write,
    Delete,
}

impl OperationKind {
    /// Filter mask bit for writes.
    pub const WRITE_FLAG: u32 = 0x1;
    /// Filter mask bit for deletes.
    pub const DELETE_FLAG: u32 = 0x2;
    /// Both bits.
    pub const ALL_FLAGS: u32 = Self::WRITE_FLAG | Self::DELETE_FLAG;

    /// Bit this operation occupies in a filter mask.
    pub fn flag(self) -> u32 {
        match self {
            OperationKind::Write => Self::WRITE_FLAG,
            OperationKind::Delete => Self::DELETE_FLAG,
        }
    }

    /// True when `mask` selects this operation.
    pub fn is_in(self, mask: u32) -> bool {
        mask & self.flag() != 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Write => "write",
            OperationKind::Delete => "delete",
        }
    }

    /// Parse the lowercase config spelling (`write`, `set` / `delete`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "write" | "set" => Some(OperationKind::Write),
            "delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OperationKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OperationKind::parse(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown operation '{}' (expected 'write' or 'delete')",
                s
            ))
        })
    }
}

/// Final outcome of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_denied(&self) -> bool {
        matches!(self, Verdict::Deny)
    }

    /// Host status that carries this verdict.
    pub fn status(self) -> CallbackStatus {
        match self {
            Verdict::Allow => CallbackStatus::Continue,
            Verdict::Deny => CallbackStatus::AccessDenied,
        }
    }
}

/// Status a registry callback returns to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallbackStatus {
    /// Let the operation proceed normally.
    #[default]
    Continue,
    /// Reject the operation; the caller observes an access-denied failure.
    AccessDenied,
}

impl CallbackStatus {
    pub fn is_continue(&self) -> bool {
        matches!(self, CallbackStatus::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_flags_are_disjoint() {
        assert_eq!(OperationKind::Write.flag() & OperationKind::Delete.flag(), 0);
        assert!(OperationKind::Write.is_in(OperationKind::ALL_FLAGS));
        assert!(OperationKind::Delete.is_in(OperationKind::ALL_FLAGS));
        assert!(!OperationKind::Delete.is_in(OperationKind::WRITE_FLAG));
    }

    #[test]
    fn test_operation_parse_accepts_aliases() {
        assert_eq!(OperationKind::parse("write"), Some(OperationKind::Write));
        assert_eq!(OperationKind::parse("SET"), Some(OperationKind::Write));
        assert_eq!(OperationKind::parse("Delete"), Some(OperationKind::Delete));
        assert_eq!(OperationKind::parse("create"), None);
    }

    #[test]
    fn test_verdict_maps_to_host_status() {
        assert_eq!(Verdict::Allow.status(), CallbackStatus::Continue);
        assert_eq!(Verdict::Deny.status(), CallbackStatus::AccessDenied);
        assert!(CallbackStatus::default().is_continue());
    }
}
