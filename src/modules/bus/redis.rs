/// Redis pub/sub backed bus.
///
/// Publishing goes through the pooled connections. Every subscription owns
/// a dedicated PSUBSCRIBE connection driven by a background task that
/// reconnects with exponential back-off. Redis globs are wider than bus
/// patterns (`*` crosses dots), so messages are re-checked with
/// [`subject::matches`] before reaching the handler.
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{PoolConfig, Runtime};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{subject, Bus, BusHandler, BusMessage, Subscription};
use crate::api::error;

const RECONNECT_BASE: Duration = Duration::from_millis(250);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

pub struct RedisBus {
    pool: deadpool_redis::Pool,
    client: redis::Client,
    listeners: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl RedisBus {
    pub fn new(url: &str) -> Result<Self, error::SystemError> {
        let mut cfg = deadpool_redis::Config::from_url(url);
        cfg.pool = Some(PoolConfig { max_size: 16, ..Default::default() });
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        let client = redis::Client::open(url)?;

        Ok(Self { pool, client, listeners: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) })
    }

    /// Round-trips a PING so start-up fails fast on a bad URL.
    pub async fn ping(&self) -> Result<(), error::SystemError> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING").query_async::<()>(&mut *conn).await?;
        Ok(())
    }
}

impl Drop for RedisBus {
    fn drop(&mut self) {
        let listeners = self.listeners.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, listener) in listeners.drain() {
            listener.abort();
        }
    }
}

#[async_trait::async_trait]
impl Bus for RedisBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), error::SystemError> {
        if !subject::is_valid_subject(subject) {
            return Err(error::SystemError::bus(format!("invalid subject `{subject}`")));
        }

        let mut conn = self.pool.get().await?;
        conn.publish::<_, _, ()>(subject, payload).await?;
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

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener =
            runtime.spawn(listen(self.client.clone(), pattern.to_string(), handler));

        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).insert(id, listener);
        Ok(Subscription::new(id, pattern))
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let listener =
            self.listeners.lock().unwrap_or_else(|e| e.into_inner()).remove(&subscription.id());

        if let Some(listener) = listener {
            listener.abort();
            tracing::debug!(pattern = subscription.pattern(), "redis subscription closed");
        }
    }
}

/// Bus pattern to Redis glob. Literal tokens are escaped.
fn glob_pattern(pattern: &str) -> String {
    pattern
        .split('.')
        .map(|token| match token {
            "*" | ">" => "*".to_string(),
            literal => {
                let mut escaped = String::with_capacity(literal.len());
                for c in literal.chars() {
                    if matches!(c, '*' | '?' | '[' | ']' | '\\') {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
                escaped
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn backoff(attempt: u32) -> Duration {
    RECONNECT_BASE.saturating_mul(1 << attempt.min(7)).min(RECONNECT_MAX)
}

async fn listen(client: redis::Client, pattern: String, handler: BusHandler) {
    let glob = glob_pattern(&pattern);
    let mut attempt = 0u32;

    loop {
        match listen_once(&client, &pattern, &glob, &handler).await {
            Ok(()) => {
                attempt = 0;
                tracing::warn!(pattern = %pattern, "redis pubsub stream ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(pattern = %pattern, error = %e, attempt, "redis pubsub failed");
                attempt = attempt.saturating_add(1);
            }
        }
        tokio::time::sleep(backoff(attempt)).await;
    }
}

async fn listen_once(
    client: &redis::Client,
    pattern: &str,
    glob: &str,
    handler: &BusHandler,
) -> Result<(), redis::RedisError> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(glob).await?;
    tracing::info!(pattern, "redis subscription active");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name();
        if !subject::matches(pattern, channel) {
            continue;
        }
        handler(BusMessage {
            subject: channel.to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        });
    }

    Ok(())
}
