//! Client-side event emitter.
//!
//! Event units subscribe here through the registry; a gateway adapter (or
//! the console) feeds events in with [`EventBus::emit`].

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::client::Client;
use crate::unit::{ListenMode, ListenerFn};

/// Handle returned by [`EventBus::on`] and [`EventBus::once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// What a listener receives.
#[derive(Clone)]
pub struct EventContext {
    pub client: Client,
    pub name: String,
    pub payload: Value,
}

struct Subscription {
    id: SubscriptionId,
    mode: ListenMode,
    listener: ListenerFn,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<Subscription>>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, name: impl Into<String>, listener: ListenerFn) -> SubscriptionId {
        self.subscribe(name.into(), ListenMode::On, listener)
    }

    /// Subscribe for a single delivery.
    pub fn once(&self, name: impl Into<String>, listener: ListenerFn) -> SubscriptionId {
        self.subscribe(name.into(), ListenMode::Once, listener)
    }

    pub fn subscribe(
        &self,
        name: String,
        mode: ListenMode,
        listener: ListenerFn,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .entry(name)
            .or_default()
            .push(Subscription { id, mode, listener });
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn off(&self, name: &str, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let Some(subs) = listeners.get_mut(name) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|s| s.id != id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            listeners.remove(name);
        }
        removed
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every current listener, in subscription order.
    ///
    /// Returns how many listeners were invoked. A listener that fails or
    /// panics is logged and the remaining ones still run.
    pub async fn emit(&self, client: &Client, name: &str, payload: Value) -> usize {
        let batch: Vec<ListenerFn> = {
            let mut listeners = self.inner.listeners.lock();
            let Some(subs) = listeners.get_mut(name) else {
                return 0;
            };
            let batch = subs.iter().map(|s| s.listener.clone()).collect();
            subs.retain(|s| s.mode == ListenMode::On);
            if subs.is_empty() {
                listeners.remove(name);
            }
            batch
        };

        let delivered = batch.len();
        for listener in batch {
            let ctx = EventContext {
                client: client.clone(),
                name: name.to_string(),
                payload: payload.clone(),
            };
            match AssertUnwindSafe(listener(ctx)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("[event] listener for '{name}' failed: {e:#}"),
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "listener panicked".to_string());
                    tracing::warn!("[event] listener for '{name}' panicked: {reason}");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::DryRunPlatform;
    use crate::unit::listener;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: Arc<AtomicUsize>) -> ListenerFn {
        listener(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_once_listener_fires_once() {
        let client = Client::new(Arc::new(DryRunPlatform::default()));
        let bus = client.events().clone();
        let count = Arc::new(AtomicUsize::new(0));

        bus.once("ready", counting(count.clone()));
        assert_eq!(bus.emit(&client, "ready", Value::Null).await, 1);
        assert_eq!(bus.emit(&client, "ready", Value::Null).await, 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("ready"), 0);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_others() {
        let client = Client::new(Arc::new(DryRunPlatform::default()));
        let bus = client.events().clone();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on("messageCreate", listener(|_| async { Err(anyhow::anyhow!("boom")) }));
        let id = bus.on("messageCreate", counting(count.clone()));

        assert_eq!(bus.emit(&client, "messageCreate", Value::Null).await, 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(bus.off("messageCreate", id));
        assert!(!bus.off("messageCreate", id));
        assert_eq!(bus.listener_count("messageCreate"), 1);
    }

    async fn explode(_: EventContext) -> anyhow::Result<()> {
        panic!("listener blew up")
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_stop_others() {
        let client = Client::new(Arc::new(DryRunPlatform::default()));
        let bus = client.events().clone();
        let count = Arc::new(AtomicUsize::new(0));

        bus.on("messageCreate", listener(explode));
        bus.on("messageCreate", counting(count.clone()));

        assert_eq!(bus.emit(&client, "messageCreate", Value::Null).await, 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Both subscriptions survive and the next delivery works the same way
        assert_eq!(bus.emit(&client, "messageCreate", Value::Null).await, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
