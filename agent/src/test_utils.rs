//! Shared test utilities for the agent crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use regguard_intercept::Interceptor;
use regguard_policy::RuleMatcher;
use regguard_protocol::OperationKind;

/// Matcher with a fixed rule list and a call counter.
pub struct ScriptedMatcher {
    rules: Vec<(String, OperationKind)>,
    deny_all: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedMatcher {
    /// Deny `op` on exactly `path` (case-insensitive).
    pub fn deny(path: &str, op: OperationKind) -> Self {
        Self {
            rules: vec![(path.to_lowercase(), op)],
            deny_all: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn deny_everything() -> Self {
        Self {
            rules: Vec::new(),
            deny_all: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Counter that outlives the matcher once it is handed to a filter.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl RuleMatcher for ScriptedMatcher {
    fn matches(&self, full_path: &str, operation: OperationKind) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.deny_all {
            return true;
        }
        let folded = full_path.to_lowercase();
        self.rules
            .iter()
            .any(|(path, op)| *path == folded && *op == operation)
    }
}

#[derive(Default)]
struct GateState {
    entered: bool,
    released: bool,
}

/// Test-side handle for a [`BlockingMatcher`].
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    /// Block until a matcher call is parked on the gate.
    pub fn wait_entered(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        while !state.entered {
            state = cvar.wait(state).unwrap();
        }
    }

    pub fn release(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap().released = true;
        cvar.notify_all();
    }

    fn enter_and_wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap();
        state.entered = true;
        cvar.notify_all();
        while !state.released {
            state = cvar.wait(state).unwrap();
        }
    }
}

/// Matcher whose calls park until the gate is released. Never denies.
pub struct BlockingMatcher {
    gate: Gate,
    dropped: Arc<AtomicBool>,
}

impl BlockingMatcher {
    pub fn new() -> (Self, Gate) {
        let gate = Gate::default();
        let matcher = Self {
            gate: gate.clone(),
            dropped: Arc::new(AtomicBool::new(false)),
        };
        (matcher, gate)
    }

    pub fn drop_flag(&self) -> Arc<AtomicBool> {
        self.dropped.clone()
    }
}

impl RuleMatcher for BlockingMatcher {
    fn matches(&self, _full_path: &str, _operation: OperationKind) -> bool {
        self.gate.enter_and_wait();
        false
    }
}

impl Drop for BlockingMatcher {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

/// Records how many callbacks were still installed when its matcher dropped.
pub struct DropProbe {
    interceptor: Weak<Interceptor>,
    dropped: Arc<AtomicBool>,
    callbacks_at_drop: Arc<Mutex<Option<usize>>>,
}

impl DropProbe {
    pub fn new(interceptor: Arc<Interceptor>) -> Self {
        Self {
            interceptor: Arc::downgrade(&interceptor),
            dropped: Arc::new(AtomicBool::new(false)),
            callbacks_at_drop: Arc::new(Mutex::new(None)),
        }
    }

    /// A matcher reporting back to this probe. Never denies.
    pub fn matcher(&self) -> ProbeMatcher {
        ProbeMatcher {
            interceptor: self.interceptor.clone(),
            dropped: self.dropped.clone(),
            callbacks_at_drop: self.callbacks_at_drop.clone(),
        }
    }

    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn callbacks_at_drop(&self) -> Option<usize> {
        *self.callbacks_at_drop.lock().unwrap()
    }
}

pub struct ProbeMatcher {
    interceptor: Weak<Interceptor>,
    dropped: Arc<AtomicBool>,
    callbacks_at_drop: Arc<Mutex<Option<usize>>>,
}

impl RuleMatcher for ProbeMatcher {
    fn matches(&self, _full_path: &str, _operation: OperationKind) -> bool {
        false
    }
}

impl Drop for ProbeMatcher {
    fn drop(&mut self) {
        let installed = self.interceptor.upgrade().map(|i| i.len());
        *self.callbacks_at_drop.lock().unwrap() = installed;
        self.dropped.store(true, Ordering::SeqCst);
    }
}
