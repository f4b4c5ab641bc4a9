/// Pub/sub bus
///
/// Best-effort fan-out between the messaging service, the domain emitters
/// and the hub. Publishing never waits for subscribers and there is no
/// acknowledgement. Each subscription gets its own worker so handler calls
/// for one subscription never overlap.
use serde::Serialize;
use std::sync::Arc;

use crate::api::error;

pub mod memory;
pub mod redis;
pub mod subject;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

pub type BusHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Handle returned by [`Bus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    pattern: String,
}

impl Subscription {
    pub(crate) fn new(id: u64, pattern: &str) -> Self {
        Self { id, pattern: pattern.to_string() }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[async_trait::async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), error::SystemError>;

    /// Registers `handler` for every subject matching `pattern`. Returns as
    /// soon as the subscription is recorded.
    fn subscribe(
        &self,
        pattern: &str,
        handler: BusHandler,
    ) -> Result<Subscription, error::SystemError>;

    /// Idempotent.
    fn unsubscribe(&self, subscription: &Subscription);
}

/// Serializes `value` and publishes it. Failures are logged and swallowed.
pub async fn publish_json<T>(bus: &dyn Bus, subject: &str, value: &T)
where
    T: Serialize + Sync + ?Sized,
{
    let payload = match serde_json::to_vec(value) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(subject, error = %e, "failed to encode bus payload");
            return;
        }
    };

    if let Err(e) = bus.publish(subject, payload).await {
        tracing::warn!(subject, error = %e, "bus publish failed");
    }
}
