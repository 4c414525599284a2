use bundl_common::Money;
use chrono::Duration;
use thiserror::Error;

use crate::db_types::{Order, OrderId, UserId};

/// Result of the scripted pledge. The accept arm carries the post-mutation snapshot so callers never have to
/// re-read the cache (and race a concurrent pledge) to learn what they just did.
#[derive(Debug, Clone, PartialEq)]
pub enum PledgeScriptOutcome {
    /// No snapshot under the order key and no completion marker: the order never existed, or its TTL has fired.
    NotFound,
    /// The snapshot exists but is no longer ACTIVE.
    NotActive,
    /// The threshold was already met when the pledge ran. Completion cleanup leaves a marker with the snapshot's
    /// remaining lifetime, so this is also what a pledge arriving after the snapshot's removal is told; the
    /// lagging durable row never has to be consulted to tell a completed order from a vanished one.
    AlreadyComplete,
    Accepted {
        /// The updated snapshot, exactly as committed by the script.
        order: Order,
        /// This pledge pushed `total_pledge` over the threshold. The script has already removed the snapshot,
        /// participant set and geo entry.
        completed: bool,
        /// The pledger was not previously in the pledge map.
        joined: bool,
    },
}

/// The live cache holds the working copy of every ACTIVE order: a serialized snapshot under TTL, a geo-index entry
/// and the participant set. All pledge mutation happens here, in a single server-side step per pledge.
#[allow(async_fn_in_trait)]
pub trait LiveOrderCache {
    /// Writes snapshot, participant set and geo entry. Atomic from the caller's perspective. The snapshot and
    /// participant set carry `ttl`; the geo entry persists until explicit removal.
    async fn store_order(&self, order: &Order, ttl: Duration) -> Result<(), CacheError>;

    /// Deserializes the snapshot, or `None` when the key is absent (expired or never stored).
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, CacheError>;

    /// Removes snapshot, participant set and geo entry. Idempotent.
    async fn remove_order(&self, order_id: &OrderId) -> Result<(), CacheError>;

    /// The scripted pledge: load snapshot, verify ACTIVE and below threshold, fold in the pledge, and either write
    /// the snapshot back preserving its TTL or, on completion, clean up all three entries and drop a completion
    /// marker in their place, all as one visible transition.
    async fn pledge(
        &self,
        order_id: &OrderId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<PledgeScriptOutcome, CacheError>;

    /// Best-effort discovery read: snapshots of the orders whose geo entry lies within `radius_km` of the given
    /// point. Entries whose snapshot expired between the geo lookup and the read are filtered out.
    async fn find_near(&self, latitude: f64, longitude: f64, radius_km: f64) -> Result<Vec<Order>, CacheError>;
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection error: {0}")]
    ConnectionError(String),
    #[error("Cached snapshot is corrupt: {0}")]
    CorruptSnapshot(String),
    #[error("Pledge script failed: {0}")]
    ScriptError(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        Self::ConnectionError(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::CorruptSnapshot(e.to_string())
    }
}
