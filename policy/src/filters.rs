//! Runtime-managed registry block filters.
//!
//! Each filter pairs a path pattern with an operation mask. Lookups read an
//! `Arc` snapshot, so callbacks never wait on a writer for longer than one
//! pointer copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, warn};
use regguard_protocol::OperationKind;

use crate::error::{Result, ValidationError};
use crate::matcher::RuleMatcher;
use crate::pattern::{compile_pattern, CompiledPattern};

/// A single block filter.
#[derive(Debug)]
pub struct Filter {
    pub id: u64,
    pub pattern: CompiledPattern,
    /// Bitwise OR of [`OperationKind::flag`] values.
    pub operations: u32,
}

impl Filter {
    pub fn applies_to(&self, path: &str, operation: OperationKind) -> bool {
        operation.is_in(self.operations) && self.pattern.matches(path)
    }
}

/// Concurrent store of block filters.
pub struct StringFilters {
    filters: RwLock<Arc<Vec<Arc<Filter>>>>,
    next_id: AtomicU64,
}

impl Default for StringFilters {
    fn default() -> Self {
        Self::new()
    }
}

impl StringFilters {
    pub fn new() -> Self {
        Self {
            filters: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a filter blocking `operations` on paths matching `pattern`.
    /// Returns the id used to remove it.
    pub fn add_filter(&self, pattern: &str, operations: u32) -> Result<u64> {
        if operations & OperationKind::ALL_FLAGS == 0 {
            return Err(ValidationError::NoOperations(pattern.to_string()).into());
        }
        let compiled = compile_pattern(pattern)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let filter = Arc::new(Filter {
            id,
            pattern: compiled,
            operations: operations & OperationKind::ALL_FLAGS,
        });

        let mut guard = self.filters.write().unwrap_or_else(|e| e.into_inner());
        let mut updated = (**guard).clone();
        updated.push(filter);
        *guard = Arc::new(updated);

        debug!("Added filter {}: {} (ops {:#x})", id, pattern, operations);
        Ok(id)
    }

    /// Remove a filter by id. Returns false if no such filter exists.
    pub fn remove_filter(&self, id: u64) -> bool {
        let mut guard = self.filters.write().unwrap_or_else(|e| e.into_inner());
        let Some(index) = guard.iter().position(|f| f.id == id) else {
            warn!("No filter with id {}", id);
            return false;
        };
        let mut updated = (**guard).clone();
        let removed = updated.remove(index);
        *guard = Arc::new(updated);
        debug!("Removed filter {}: {}", id, removed.pattern.original());
        true
    }

    /// First filter that blocks `operation` on `path`.
    pub fn matching_filter(&self, path: &str, operation: OperationKind) -> Option<Arc<Filter>> {
        self.snapshot()
            .iter()
            .find(|f| f.applies_to(path, operation))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Filter>>> {
        self.filters
            .read()
            .map(|guard| Arc::clone(&*guard))
            .unwrap_or_else(|e| Arc::clone(&*e.into_inner()))
    }
}

impl RuleMatcher for StringFilters {
    fn matches(&self, full_path: &str, operation: OperationKind) -> bool {
        self.snapshot()
            .iter()
            .any(|f| f.applies_to(full_path, operation))
    }
}
