//! The owner context handed to units, executors and listeners.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::PlatformError;
use crate::events::EventBus;
use crate::platform::{Interaction, Platform, Reply};

struct ClientInner {
    platform: Arc<dyn Platform>,
    events: EventBus,
    started_at: Instant,
}

/// Cheap to clone; every clone shares the same platform and event bus.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                platform,
                events: EventBus::new(),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.inner.platform
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    pub async fn reply(&self, interaction: &Interaction, reply: Reply) -> Result<(), PlatformError> {
        self.inner.platform.respond(interaction, reply).await
    }

    /// Emit an event on this client's bus.
    pub async fn emit(&self, name: &str, payload: Value) -> usize {
        self.inner.events.emit(self, name, payload).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("uptime", &self.uptime())
            .finish_non_exhaustive()
    }
}
