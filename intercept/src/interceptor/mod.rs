use crate::interceptor::listener::RegistryListener;
use crate::types::{HookError, Notification};
use log::{debug, warn};
use regguard_protocol::CallbackStatus;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

pub mod listener;

/// Token identifying one registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cookie(u64);

impl Cookie {
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Decimal load-order position. Higher altitudes see notifications first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Altitude {
    whole: u64,
    // Fraction digits with trailing zeros removed, compared lexicographically.
    fraction: String,
}

impl Altitude {
    fn parse(s: &str) -> Result<Self, HookError> {
        let invalid = || HookError::InvalidAltitude(s.to_string());
        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole = whole.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self {
            whole,
            fraction: fraction.trim_end_matches('0').to_string(),
        })
    }
}

impl Ord for Altitude {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.whole
            .cmp(&other.whole)
            .then_with(|| self.fraction.cmp(&other.fraction))
    }
}

impl PartialOrd for Altitude {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct RundownState {
    active: usize,
    closing: bool,
}

/// One registered callback plus the run-down protection guarding its listener.
struct CallbackBlock {
    cookie: Cookie,
    altitude: Altitude,
    altitude_text: String,
    listener: Mutex<Option<Arc<dyn RegistryListener>>>,
    state: Mutex<RundownState>,
    drained: Condvar,
}

impl CallbackBlock {
    /// Take a run-down reference. Fails once removal has begun.
    fn enter(&self) -> Option<ActiveCall<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closing {
            return None;
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        state.active += 1;
        Some(ActiveCall {
            block: self,
            listener: Some(listener),
        })
    }

    fn leave(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active -= 1;
        if state.active == 0 && state.closing {
            self.drained.notify_all();
        }
    }

    /// Refuse new references and wait until every outstanding one is gone,
    /// then drop the listener.
    fn run_down(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closing = true;
        while state.active > 0 {
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        drop(state);
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(listener);
    }
}

/// An in-flight listener invocation. Releases its run-down reference on drop,
/// after dropping its listener reference.
struct ActiveCall<'a> {
    block: &'a CallbackBlock,
    listener: Option<Arc<dyn RegistryListener>>,
}

impl ActiveCall<'_> {
    fn notify(&self, notification: &Notification<'_>) -> CallbackStatus {
        match &self.listener {
            Some(listener) => listener.on_notify(notification),
            None => CallbackStatus::Continue,
        }
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.listener.take();
        self.block.leave();
    }
}

/// The host's registry callback table.
///
/// Notifications are delivered in-line on the calling thread. [`remove`]
/// is the synchronization barrier: once it returns, the removed listener is
/// not running on any thread and will never be invoked again.
///
/// [`remove`]: Interceptor::remove
pub struct Interceptor {
    // Sorted by descending altitude. Snapshotted per notification so the lock
    // is never held while a listener runs.
    callbacks: RwLock<Arc<Vec<Arc<CallbackBlock>>>>,
    next_cookie: AtomicU64,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(Arc::new(Vec::new())),
            next_cookie: AtomicU64::new(1),
        }
    }

    /// Register `listener` at `altitude`.
    pub fn install(
        &self,
        altitude: &str,
        listener: Arc<dyn RegistryListener>,
    ) -> Result<Cookie, HookError> {
        let parsed = Altitude::parse(altitude)?;
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());

        if callbacks.iter().any(|b| b.altitude == parsed) {
            warn!("Altitude {} already registered", altitude);
            return Err(HookError::AltitudeCollision(altitude.to_string()));
        }

        let cookie = Cookie(self.next_cookie.fetch_add(1, Ordering::Relaxed));
        let block = Arc::new(CallbackBlock {
            cookie,
            altitude: parsed,
            altitude_text: altitude.to_string(),
            listener: Mutex::new(Some(listener)),
            state: Mutex::new(RundownState::default()),
            drained: Condvar::new(),
        });

        let mut updated = (**callbacks).clone();
        let position = updated
            .iter()
            .position(|b| b.altitude < block.altitude)
            .unwrap_or(updated.len());
        updated.insert(position, block);
        *callbacks = Arc::new(updated);

        debug!("Installed callback {} at altitude {}", cookie.0, altitude);
        Ok(cookie)
    }

    /// Unregister the callback for `cookie`, blocking until no invocation of
    /// it is in flight.
    pub fn remove(&self, cookie: Cookie) -> Result<(), HookError> {
        let block = {
            let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
            let index = callbacks
                .iter()
                .position(|b| b.cookie == cookie)
                .ok_or(HookError::UnknownCookie(cookie.0))?;
            let mut updated = (**callbacks).clone();
            let block = updated.remove(index);
            *callbacks = Arc::new(updated);
            block
        };

        block.run_down();
        debug!(
            "Removed callback {} at altitude {}",
            cookie.0, block.altitude_text
        );
        Ok(())
    }

    /// Deliver `notification` to every registered listener, highest altitude
    /// first, stopping at the first one that does not continue.
    pub fn notify(&self, notification: &Notification<'_>) -> CallbackStatus {
        let snapshot = self
            .callbacks
            .read()
            .map(|guard| Arc::clone(&*guard))
            .unwrap_or_else(|e| Arc::clone(&*e.into_inner()));

        for block in snapshot.iter() {
            let Some(call) = block.enter() else {
                continue;
            };
            let status = call.notify(notification);
            drop(call);
            if !status.is_continue() {
                return status;
            }
        }
        CallbackStatus::Continue
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .map(|c| c.len())
            .unwrap_or_else(|e| e.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeleteKeyInformation, KeyObject};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn delete_key_notification() -> Notification<'static> {
        Notification::PreDeleteKey(DeleteKeyInformation {
            object: KeyObject::from_raw(1),
        })
    }

    fn counting_listener(
        hits: Arc<AtomicUsize>,
        status: CallbackStatus,
    ) -> Arc<dyn RegistryListener> {
        Arc::new(move |_: &Notification<'_>| {
            hits.fetch_add(1, Ordering::SeqCst);
            status
        })
    }

    #[test]
    fn test_altitude_parse_accepts_decimal_and_fraction() {
        assert!(Altitude::parse("385200").is_ok());
        assert!(Altitude::parse("385200.5").is_ok());
        assert!(Altitude::parse("").is_err());
        assert!(Altitude::parse("38a").is_err());
        assert!(Altitude::parse(".5").is_err());
    }

    #[test]
    fn test_altitude_ordering_compares_fractions() {
        let a = Altitude::parse("100.5").unwrap();
        let b = Altitude::parse("100.25").unwrap();
        let c = Altitude::parse("100.50").unwrap();
        assert!(a > b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_install_rejects_duplicate_altitude() {
        let interceptor = Interceptor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        interceptor
            .install("385200", counting_listener(hits.clone(), CallbackStatus::Continue))
            .unwrap();
        let err = interceptor
            .install("385200.0", counting_listener(hits, CallbackStatus::Continue))
            .unwrap_err();
        assert_eq!(err, HookError::AltitudeCollision("385200.0".to_string()));
        assert_eq!(interceptor.len(), 1);
    }

    #[test]
    fn test_install_rejects_malformed_altitude() {
        let interceptor = Interceptor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let err = interceptor
            .install("high", counting_listener(hits, CallbackStatus::Continue))
            .unwrap_err();
        assert!(matches!(err, HookError::InvalidAltitude(_)));
        assert!(interceptor.is_empty());
    }

    #[test]
    fn test_notify_runs_highest_altitude_first_and_short_circuits() {
        let interceptor = Interceptor::new();
        let low = Arc::new(AtomicUsize::new(0));
        let high = Arc::new(AtomicUsize::new(0));
        interceptor
            .install("1000", counting_listener(low.clone(), CallbackStatus::Continue))
            .unwrap();
        interceptor
            .install("2000", counting_listener(high.clone(), CallbackStatus::AccessDenied))
            .unwrap();

        let status = interceptor.notify(&delete_key_notification());
        assert_eq!(status, CallbackStatus::AccessDenied);
        assert_eq!(high.load(Ordering::SeqCst), 1);
        assert_eq!(low.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_without_listeners_continues() {
        let interceptor = Interceptor::new();
        assert_eq!(
            interceptor.notify(&delete_key_notification()),
            CallbackStatus::Continue
        );
    }

    #[test]
    fn test_remove_unknown_cookie_fails() {
        let interceptor = Interceptor::new();
        assert_eq!(
            interceptor.remove(Cookie(42)),
            Err(HookError::UnknownCookie(42))
        );
    }

    #[test]
    fn test_removed_listener_is_never_invoked() {
        let interceptor = Interceptor::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let cookie = interceptor
            .install("385200", counting_listener(hits.clone(), CallbackStatus::Continue))
            .unwrap();
        interceptor.notify(&delete_key_notification());
        interceptor.remove(cookie).unwrap();
        interceptor.notify(&delete_key_notification());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_waits_for_in_flight_invocation() {
        let interceptor = Arc::new(Interceptor::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let finished = Arc::new(AtomicBool::new(false));

        let finished_in_listener = finished.clone();
        let listener: Arc<dyn RegistryListener> = Arc::new(move |_: &Notification<'_>| {
            let _ = entered_tx.send(());
            let _ = release_rx.lock().unwrap().recv();
            finished_in_listener.store(true, Ordering::SeqCst);
            CallbackStatus::Continue
        });
        let cookie = interceptor.install("385200", listener).unwrap();

        let notifier = {
            let interceptor = interceptor.clone();
            thread::spawn(move || interceptor.notify(&delete_key_notification()))
        };
        entered_rx.recv().unwrap();

        let remover = {
            let interceptor = interceptor.clone();
            thread::spawn(move || interceptor.remove(cookie))
        };

        // The remover must still be blocked while the listener is running.
        thread::sleep(Duration::from_millis(50));
        assert!(!remover.is_finished());

        release_tx.send(()).unwrap();
        remover.join().unwrap().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(notifier.join().unwrap(), CallbackStatus::Continue);
    }

    #[test]
    fn test_remove_drops_listener_after_drain() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        struct Flagged(DropFlag);
        impl RegistryListener for Flagged {
            fn on_notify(&self, _: &Notification<'_>) -> CallbackStatus {
                CallbackStatus::Continue
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let interceptor = Interceptor::new();
        let cookie = interceptor
            .install("385200", Arc::new(Flagged(DropFlag(dropped.clone()))))
            .unwrap();
        assert!(!dropped.load(Ordering::SeqCst));
        interceptor.remove(cookie).unwrap();
        assert!(dropped.load(Ordering::SeqCst));
    }
}
