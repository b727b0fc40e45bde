//! Per-notification handling: classify, resolve, decide, answer the host.

use std::sync::Arc;

use log::{info, trace};
use regguard_intercept::{
    KeyObject, Notification, RegNotifyClass, RegistryHost, RegistryListener, UnicodeString,
};
use regguard_policy::RuleMatcher;
use regguard_protocol::{CallbackStatus, OperationKind};

use crate::decision::DecisionEngine;
use crate::resolver::NameResolver;

/// What a notification asks the filter to govern.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    PreSetValue {
        object: KeyObject,
        value_name: Option<UnicodeString<'a>>,
    },
    PreDeleteValue {
        object: KeyObject,
        value_name: Option<UnicodeString<'a>>,
    },
    /// Everything else, including post-operation notifications.
    Other(RegNotifyClass),
}

impl<'a> Operation<'a> {
    pub fn classify(notification: &Notification<'a>) -> Self {
        match notification {
            Notification::PreSetValueKey(info) => Operation::PreSetValue {
                object: info.object,
                value_name: info.value_name,
            },
            Notification::PreDeleteValueKey(info) => Operation::PreDeleteValue {
                object: info.object,
                value_name: info.value_name,
            },
            other => Operation::Other(other.class()),
        }
    }

    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            Operation::PreSetValue { .. } => Some(OperationKind::Write),
            Operation::PreDeleteValue { .. } => Some(OperationKind::Delete),
            Operation::Other(_) => None,
        }
    }
}

/// The registry callback: drives [`NameResolver`] and [`DecisionEngine`] for
/// value writes and deletes and lets everything else through.
pub struct InterceptionDispatcher<H: ?Sized, M: ?Sized> {
    resolver: NameResolver<H>,
    engine: DecisionEngine<M>,
}

impl<H, M> InterceptionDispatcher<H, M>
where
    H: RegistryHost + ?Sized,
    M: RuleMatcher + ?Sized,
{
    pub fn new(host: Arc<H>, matcher: Arc<M>) -> Self {
        Self {
            resolver: NameResolver::new(host),
            engine: DecisionEngine::new(matcher),
        }
    }

    pub fn dispatch(&self, notification: &Notification<'_>) -> CallbackStatus {
        match Operation::classify(notification) {
            Operation::PreSetValue { object, value_name } => self.govern(
                notification.class(),
                OperationKind::Write,
                object,
                value_name.as_ref(),
            ),
            Operation::PreDeleteValue { object, value_name } => self.govern(
                notification.class(),
                OperationKind::Delete,
                object,
                value_name.as_ref(),
            ),
            Operation::Other(class) => {
                trace!("Ignoring {}", class);
                CallbackStatus::Continue
            }
        }
    }

    fn govern(
        &self,
        class: RegNotifyClass,
        operation: OperationKind,
        object: KeyObject,
        value_name: Option<&UnicodeString<'_>>,
    ) -> CallbackStatus {
        let resolution = self.resolver.resolve(object, value_name);
        let verdict = self.engine.decide(operation, &resolution);

        if verdict.is_denied() {
            if let Ok(path) = &resolution {
                info!("Detected {} of {}. Prevented {}!", class, path, operation);
            }
        }
        verdict.status()
    }
}

impl<H, M> RegistryListener for InterceptionDispatcher<H, M>
where
    H: RegistryHost + ?Sized,
    M: RuleMatcher + ?Sized,
{
    fn on_notify(&self, notification: &Notification<'_>) -> CallbackStatus {
        self.dispatch(notification)
    }
}
