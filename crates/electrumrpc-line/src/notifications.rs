//! Server push notifications.
//!
//! Electrum servers interleave notifications such as
//! `blockchain.headers.subscribe` or `blockchain.scripthash.subscribe` with
//! ordinary responses. The transport hands them to a [`NotificationRouter`],
//! which forwards each one to whoever registered for its method.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;

type Routes = HashMap<String, mpsc::UnboundedSender<Notification>>;

/// A message pushed by the server without a request id.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

/// Routes notifications to per-method channels.
#[derive(Clone, Default)]
pub struct NotificationRouter {
    routes: Arc<Mutex<Routes>>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every future notification for `method`.
    ///
    /// Registering the same method twice replaces the earlier receiver.
    pub fn register(&self, method: impl Into<String>) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(method.into(), tx);
        rx
    }

    /// Forward a notification. Returns `false` if nobody is listening.
    pub fn dispatch(&self, notification: Notification) -> bool {
        let mut routes = self.lock();
        let Some(sender) = routes.get(&notification.method) else {
            return false;
        };
        if sender.send(notification.clone()).is_err() {
            // Receiver dropped; forget the route.
            routes.remove(&notification.method);
            return false;
        }
        true
    }

    /// Stop routing `method`.
    pub fn remove(&self, method: &str) {
        self.lock().remove(method);
    }

    /// Number of routed methods.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        // A poisoned map is still consistent: every operation is a single insert/remove.
        self.routes.lock().unwrap_or_else(|p| p.into_inner())
    }
}
