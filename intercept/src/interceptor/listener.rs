use crate::types::Notification;
use regguard_protocol::CallbackStatus;

/// A registry callback.
///
/// Invoked synchronously on the thread performing the registry operation,
/// possibly on many threads at once.
pub trait RegistryListener: Send + Sync {
    fn on_notify(&self, notification: &Notification<'_>) -> CallbackStatus;
}

impl<F> RegistryListener for F
where
    F: Fn(&Notification<'_>) -> CallbackStatus + Send + Sync,
{
    fn on_notify(&self, notification: &Notification<'_>) -> CallbackStatus {
        self(notification)
    }
}
