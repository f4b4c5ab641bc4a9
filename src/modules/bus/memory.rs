/// In-process bus used when no broker is configured (single node) and in tests.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use super::{subject, Bus, BusHandler, BusMessage, Subscription};
use crate::api::error;

struct Entry {
    pattern: String,
    queue: mpsc::UnboundedSender<BusMessage>,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct MemoryBus {
    registry: RwLock<HashMap<u64, Entry>>,
    next_id: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait::async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), error::SystemError> {
        if !subject::is_valid_subject(subject) {
            return Err(error::SystemError::bus(format!("invalid subject `{subject}`")));
        }

        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        for entry in registry.values().filter(|entry| subject::matches(&entry.pattern, subject)) {
            // a closed queue means the worker is gone; nothing left to deliver to
            let _ = entry
                .queue
                .send(BusMessage { subject: subject.to_string(), payload: payload.clone() });
        }

        Ok(())
    }

    fn subscribe(
        &self,
        pattern: &str,
        handler: BusHandler,
    ) -> Result<Subscription, error::SystemError> {
        if !subject::is_valid_pattern(pattern) {
            return Err(error::SystemError::bus(format!("invalid pattern `{pattern}`")));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| error::SystemError::bus("subscribe called outside a Tokio runtime"))?;

        let (queue, mut inbox) = mpsc::unbounded_channel::<BusMessage>();
        let active = Arc::new(AtomicBool::new(true));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.registry.write().unwrap_or_else(|e| e.into_inner()).insert(
            id,
            Entry { pattern: pattern.to_string(), queue, active: active.clone() },
        );

        runtime.spawn(async move {
            while let Some(message) = inbox.recv().await {
                if !active.load(Ordering::Acquire) {
                    break;
                }
                handler(message);
            }
        });

        tracing::debug!(pattern, subscription = id, "bus subscription added");
        Ok(Subscription::new(id, pattern))
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let removed =
            self.registry.write().unwrap_or_else(|e| e.into_inner()).remove(&subscription.id());

        if let Some(entry) = removed {
            entry.active.store(false, Ordering::Release);
            tracing::debug!(
                pattern = subscription.pattern(),
                subscription = subscription.id(),
                "bus subscription removed"
            );
        }
    }
}
