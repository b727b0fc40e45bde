//! Ownership of the rule matcher and the installed callback.
//!
//! State machine:
//!
//! ```text
//! Idle --start--> Registered --stop--> Unregistering --> Unregistered
//!  ^                 |
//!  +-- start fails --+ (never leaves Idle)
//! ```
//!
//! The matcher is only destroyed after the callback removal barrier has
//! returned, so no dispatcher thread can observe a released matcher.

use std::sync::Arc;

use log::{error, info, warn};
use regguard_intercept::{Cookie, HookError, Interceptor, RegistryHost, RegistryListener};
use regguard_policy::{FilterConfig, RuleMatcher, StringFilters};
use thiserror::Error;

use crate::dispatcher::InterceptionDispatcher;
use crate::settings::FilterSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Registered,
    Unregistering,
    Unregistered,
}

/// Why the filter could not be brought up. The hook is never left installed.
#[derive(Debug, Error)]
pub enum InitializationFailure {
    #[error("rule matcher construction failed: {0}")]
    Matcher(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("callback installation failed: {0}")]
    Install(#[from] HookError),

    #[error("cannot start filter in state {0:?}")]
    InvalidState(LifecycleState),
}

/// Owns the rule matcher and the registry callback that consults it.
pub struct RegistryFilter<H, M>
where
    H: RegistryHost + ?Sized + 'static,
    M: RuleMatcher + 'static,
{
    host: Arc<H>,
    interceptor: Arc<Interceptor>,
    settings: FilterSettings,
    state: LifecycleState,
    matcher: Option<Arc<M>>,
    cookie: Option<Cookie>,
}

impl<H, M> RegistryFilter<H, M>
where
    H: RegistryHost + ?Sized + 'static,
    M: RuleMatcher + 'static,
{
    /// A filter in the `Idle` state; nothing is installed yet.
    pub fn new(host: Arc<H>, interceptor: Arc<Interceptor>, settings: FilterSettings) -> Self {
        Self {
            host,
            interceptor,
            settings,
            state: LifecycleState::Idle,
            matcher: None,
            cookie: None,
        }
    }

    /// Construct the matcher and install the callback in one step.
    pub fn install<F>(
        host: Arc<H>,
        interceptor: Arc<Interceptor>,
        settings: FilterSettings,
        make_matcher: F,
    ) -> Result<Self, InitializationFailure>
    where
        F: FnOnce() -> anyhow::Result<M>,
    {
        let mut filter = Self::new(host, interceptor, settings);
        filter.start(make_matcher)?;
        Ok(filter)
    }

    /// `Idle -> Registered`.
    ///
    /// On failure the filter stays `Idle`, with no matcher and no callback.
    pub fn start<F>(&mut self, make_matcher: F) -> Result<(), InitializationFailure>
    where
        F: FnOnce() -> anyhow::Result<M>,
    {
        if self.state != LifecycleState::Idle {
            return Err(InitializationFailure::InvalidState(self.state));
        }

        let matcher = match make_matcher() {
            Ok(m) => Arc::new(m),
            Err(e) => {
                error!("Failed to construct rule matcher: {:#}", e);
                return Err(InitializationFailure::Matcher(e.into()));
            }
        };

        let dispatcher: Arc<dyn RegistryListener> = Arc::new(InterceptionDispatcher::new(
            self.host.clone(),
            matcher.clone(),
        ));
        let cookie = match self.interceptor.install(&self.settings.altitude, dispatcher) {
            Ok(cookie) => cookie,
            Err(e) => {
                error!(
                    "Failed to register registry callback at altitude {}: {}",
                    self.settings.altitude, e
                );
                release_matcher(matcher);
                return Err(e.into());
            }
        };

        self.matcher = Some(matcher);
        self.cookie = Some(cookie);
        self.state = LifecycleState::Registered;
        info!(
            "Registry filter registered at altitude {}",
            self.settings.altitude
        );
        Ok(())
    }

    /// `Registered -> Unregistering -> Unregistered`. A no-op in any other state.
    ///
    /// Removes the callback first; that call returns only once no
    /// notification is running in or can reach the dispatcher. The matcher is
    /// released afterwards.
    pub fn stop(&mut self) {
        if self.state != LifecycleState::Registered {
            return;
        }
        self.state = LifecycleState::Unregistering;

        if let Some(cookie) = self.cookie.take() {
            if let Err(e) = self.interceptor.remove(cookie) {
                warn!("Failed to remove registry callback: {}", e);
            }
        }
        if let Some(matcher) = self.matcher.take() {
            release_matcher(matcher);
        }

        self.state = LifecycleState::Unregistered;
        info!("Registry filter unregistered");
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The live matcher while registered, e.g. for adding rules at runtime.
    pub fn matcher(&self) -> Option<&M> {
        self.matcher.as_deref()
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }
}

impl<H> RegistryFilter<H, StringFilters>
where
    H: RegistryHost + ?Sized + 'static,
{
    /// Install a filter whose rules and altitude come from `config`.
    pub fn from_config(
        host: Arc<H>,
        interceptor: Arc<Interceptor>,
        config: &FilterConfig,
    ) -> Result<Self, InitializationFailure> {
        Self::install(host, interceptor, FilterSettings::from_config(config), || {
            Ok(config.build_filters()?)
        })
    }
}

impl<H, M> Drop for RegistryFilter<H, M>
where
    H: RegistryHost + ?Sized + 'static,
    M: RuleMatcher + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn release_matcher<M>(matcher: Arc<M>) {
    match Arc::try_unwrap(matcher) {
        Ok(matcher) => drop(matcher),
        Err(shared) => {
            warn!(
                "Rule matcher still has {} other reference(s); it is released when they drop",
                Arc::strong_count(&shared) - 1
            );
        }
    }
}
