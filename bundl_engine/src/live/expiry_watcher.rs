use std::time::Duration;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use super::keys::KeyFamily;
use crate::{db_types::OrderId, traits::CacheError};

pub const DEFAULT_EXPIRY_CHANNEL: &str = "__keyevent@*__:expired";

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Subscriber to the cache's key-expiration notifications.
///
/// For every expired snapshot key it extracts the order id and posts it onto the engine's expiry queue; it never
/// reads or mutates order state itself. On subscription loss it reconnects with exponential backoff; orders whose
/// notification was missed during an outage are picked up by the engine's boot-time reconciliation.
pub struct ExpiryWatcher {
    redis_url: String,
    keys: KeyFamily,
    channel_pattern: String,
    queue: mpsc::Sender<OrderId>,
}

impl ExpiryWatcher {
    pub fn new(
        redis_url: impl Into<String>,
        keys: KeyFamily,
        channel_pattern: impl Into<String>,
        queue: mpsc::Sender<OrderId>,
    ) -> Self {
        Self { redis_url: redis_url.into(), keys, channel_pattern: channel_pattern.into(), queue }
    }

    /// Starts the watcher. Do not await the returned JoinHandle, as it runs until the expiry queue closes.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                match self.subscribe_and_listen().await {
                    Ok(()) => {
                        info!("🕰️ Expiry queue closed. Watcher shutting down");
                        return;
                    },
                    Err(e) => {
                        warn!("🕰️ Expiry subscription dropped: {e}. Reconnecting in {backoff:?}");
                    },
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        })
    }

    async fn subscribe_and_listen(&self) -> Result<(), CacheError> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        // The server only publishes expired-key events when notify-keyspace-events includes them. Setting it here
        // is best effort; managed Redis instances may refuse CONFIG and must be set up out of band.
        if let Ok(mut conn) = client.get_multiplexed_async_connection().await {
            let enabled: Result<(), redis::RedisError> =
                redis::cmd("CONFIG").arg("SET").arg("notify-keyspace-events").arg("Ex").query_async(&mut conn).await;
            if let Err(e) = enabled {
                debug!("🕰️ Could not enable keyspace notifications: {e}");
            }
        }
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.psubscribe(&self.channel_pattern).await?;
        info!("🕰️ Expiry watcher subscribed to {}", self.channel_pattern);
        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            // The payload of a keyevent notification is the expired key itself.
            let key: String = msg.get_payload()?;
            let Some(order_id) = self.keys.order_id_from_key(&key) else {
                continue;
            };
            debug!("🕰️ TTL elapsed for order {order_id}");
            if self.queue.send(order_id).await.is_err() {
                return Ok(());
            }
        }
        Err(CacheError::ConnectionError("subscription stream ended".to_string()))
    }
}
