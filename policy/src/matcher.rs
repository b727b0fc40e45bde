use regguard_protocol::OperationKind;

/// Decides whether a fully-qualified value path is blocked for an operation.
///
/// Queried concurrently from every in-flight registry callback; implementors
/// handle their own synchronization.
pub trait RuleMatcher: Send + Sync {
    fn matches(&self, full_path: &str, operation: OperationKind) -> bool;
}
