use std::sync::Arc;

use bundl_common::Money;
use chrono::Duration;
use log::{trace, warn};
use redis::{
    aio::ConnectionManager,
    geo::{Coord, RadiusOptions, RadiusSearchResult, Unit},
    AsyncCommands, Client, Script,
};
use serde::Deserialize;

use super::keys::KeyFamily;
use crate::{
    db_types::{Order, OrderId, OrderStatus, UserId},
    traits::{CacheError, LiveOrderCache, PledgeScriptOutcome},
};

/// The scripted pledge: runs server-side so that the load-check-mutate-commit
/// sequence is a single visible transition. On completion it deletes the snapshot, participant set and geo entry,
/// so a concurrent discovery read can never return a completed order, and leaves a completion marker in their
/// place. The marker is what lets a losing concurrent pledger hear "already complete" instead of "not found": the
/// durable row is only updated after the script returns, so it lags and cannot be used to tell the two apart.
/// The marker inherits the snapshot's remaining lifetime.
///
/// KEYS[1] = order snapshot, KEYS[2] = participants set, KEYS[3] = geo index, KEYS[4] = completion marker.
/// ARGV[1] = user id, ARGV[2] = pledge amount.
const PLEDGE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    if redis.call('EXISTS', KEYS[4]) == 1 then
        return cjson.encode({ok=false, reason='already_complete'})
    end
    return cjson.encode({ok=false, reason='not_found'})
end
local order = cjson.decode(raw)
if order.status ~= 'ACTIVE' then
    return cjson.encode({ok=false, reason='not_active'})
end
if order.totalPledge >= order.amountNeeded then
    return cjson.encode({ok=false, reason='already_complete'})
end
local user = ARGV[1]
local amount = tonumber(ARGV[2])
local joined = false
local current = order.pledgeMap[user]
if current == nil then
    joined = true
    order.pledgeMap[user] = amount
    order.totalUsers = order.totalUsers + 1
else
    order.pledgeMap[user] = current + amount
end
order.totalPledge = order.totalPledge + amount
local completed = false
if order.totalPledge >= order.amountNeeded then
    completed = true
    order.status = 'COMPLETED'
    local ttl = redis.call('PTTL', KEYS[1])
    if ttl <= 0 then
        ttl = 60000
    end
    redis.call('DEL', KEYS[1])
    redis.call('DEL', KEYS[2])
    redis.call('ZREM', KEYS[3], KEYS[1])
    redis.call('SET', KEYS[4], '1', 'PX', ttl)
else
    if joined then
        redis.call('SADD', KEYS[2], user)
        local ttl = redis.call('PTTL', KEYS[1])
        if ttl > 0 then
            redis.call('PEXPIRE', KEYS[2], ttl)
        end
    end
    redis.call('SET', KEYS[1], cjson.encode(order), 'KEEPTTL')
end
return cjson.encode({ok=true, completed=completed, joined=joined, order=order})
"#;

/// What the pledge script hands back, before translation into [`PledgeScriptOutcome`].
#[derive(Deserialize)]
struct ScriptReply {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    joined: bool,
    #[serde(default)]
    order: Option<Order>,
}

/// Redis-backed implementation of the live order cache.
#[derive(Clone)]
pub struct RedisOrderCache {
    conn: ConnectionManager,
    keys: KeyFamily,
    pledge_script: Arc<Script>,
}

impl RedisOrderCache {
    pub async fn new(redis_url: &str, keys: KeyFamily) -> Result<Self, CacheError> {
        let client = Client::open(redis_url).map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        let conn = ConnectionManager::new(client).await.map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        Ok(Self { conn, keys, pledge_script: Arc::new(Script::new(PLEDGE_SCRIPT)) })
    }

    pub fn keys(&self) -> &KeyFamily {
        &self.keys
    }
}

impl LiveOrderCache for RedisOrderCache {
    async fn store_order(&self, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let order_key = self.keys.order_key(&order.order_id);
        let participants_key = self.keys.participants_key(&order.order_id);
        let payload = serde_json::to_string(order)?;
        let ttl_seconds = ttl.num_seconds().max(1) as u64;

        let mut pipe = redis::pipe();
        pipe.atomic().set_ex(&order_key, payload, ttl_seconds).ignore().del(&participants_key).ignore();
        if !order.pledge_map.is_empty() {
            let members = order.pledge_map.keys().map(|u| u.as_str().to_string()).collect::<Vec<String>>();
            pipe.sadd(&participants_key, members).ignore().expire(&participants_key, ttl_seconds as i64).ignore();
        }
        pipe.geo_add(self.keys.geo_key(), (Coord::lon_lat(order.longitude, order.latitude), &order_key)).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        trace!("📦️ Order {} stored in live cache with a {ttl_seconds}s TTL", order.order_id);
        Ok(())
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.keys.order_key(order_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn remove_order(&self, order_id: &OrderId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let order_key = self.keys.order_key(order_id);
        let _: () = redis::pipe()
            .atomic()
            .del(&order_key)
            .ignore()
            .del(self.keys.participants_key(order_id))
            .ignore()
            .zrem(self.keys.geo_key(), &order_key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        trace!("📦️ Order {order_id} removed from live cache");
        Ok(())
    }

    async fn pledge(
        &self,
        order_id: &OrderId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<PledgeScriptOutcome, CacheError> {
        let mut conn = self.conn.clone();
        let raw: String = self
            .pledge_script
            .key(self.keys.order_key(order_id))
            .key(self.keys.participants_key(order_id))
            .key(self.keys.geo_key())
            .key(self.keys.completed_key(order_id))
            .arg(user_id.as_str())
            .arg(amount.value())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CacheError::ScriptError(e.to_string()))?;
        let reply: ScriptReply = serde_json::from_str(&raw).map_err(|e| CacheError::ScriptError(e.to_string()))?;
        let outcome = match (reply.ok, reply.reason.as_deref()) {
            (true, _) => {
                let order = reply
                    .order
                    .ok_or_else(|| CacheError::ScriptError("accepted pledge carried no snapshot".to_string()))?;
                PledgeScriptOutcome::Accepted { order, completed: reply.completed, joined: reply.joined }
            },
            (false, Some("not_found")) => PledgeScriptOutcome::NotFound,
            (false, Some("not_active")) => PledgeScriptOutcome::NotActive,
            (false, Some("already_complete")) => PledgeScriptOutcome::AlreadyComplete,
            (false, reason) => {
                return Err(CacheError::ScriptError(format!("unexpected script reply: {reason:?}")));
            },
        };
        Ok(outcome)
    }

    async fn find_near(&self, latitude: f64, longitude: f64, radius_km: f64) -> Result<Vec<Order>, CacheError> {
        let mut conn = self.conn.clone();
        let found: Vec<RadiusSearchResult> = conn
            .geo_radius(self.keys.geo_key(), longitude, latitude, radius_km, Unit::Kilometers, RadiusOptions::default())
            .await?;
        if found.is_empty() {
            return Ok(Vec::new());
        }
        let keys = found.into_iter().map(|r| r.name).collect::<Vec<String>>();
        let mut cmd = redis::cmd("MGET");
        cmd.arg(&keys);
        let snapshots: Vec<Option<String>> = cmd.query_async(&mut conn).await?;
        // A key can expire between the geo lookup and the MGET; those holes are simply skipped, as are snapshots
        // that no longer parse.
        let orders = snapshots
            .into_iter()
            .flatten()
            .filter_map(|raw| match serde_json::from_str::<Order>(&raw) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!("📦️ Skipping unparseable snapshot in geo query: {e}");
                    None
                },
            })
            .filter(|order| order.status == OrderStatus::Active)
            .collect();
        Ok(orders)
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::NewOrder;

    // These tests require a running Redis instance.
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    fn test_order(amount_needed: i64, initial: i64) -> Order {
        NewOrder::new(Money::from(amount_needed), "zomato", 12.9716, 77.5946)
            .with_initial_pledge(Money::from(initial))
            .into_order(UserId::fresh(), Duration::seconds(60), Utc::now())
    }

    async fn test_cache() -> RedisOrderCache {
        RedisOrderCache::new("redis://127.0.0.1:6379", KeyFamily::new(format!("test:{}:", uuid::Uuid::new_v4())))
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn store_fetch_remove_round_trip() {
        let cache = test_cache().await;
        let order = test_order(100, 40);
        cache.store_order(&order, Duration::seconds(60)).await.unwrap();
        let fetched = cache.fetch_order(&order.order_id).await.unwrap().unwrap();
        assert_eq!(fetched, order);
        cache.remove_order(&order.order_id).await.unwrap();
        assert!(cache.fetch_order(&order.order_id).await.unwrap().is_none());
        // Removal is idempotent
        cache.remove_order(&order.order_id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn scripted_pledge_completes_and_cleans_up() {
        let cache = test_cache().await;
        let order = test_order(100, 40);
        cache.store_order(&order, Duration::seconds(60)).await.unwrap();

        let pledger = UserId::fresh();
        let outcome = cache.pledge(&order.order_id, &pledger, Money::from(70)).await.unwrap();
        match outcome {
            PledgeScriptOutcome::Accepted { order: updated, completed, joined } => {
                assert!(completed);
                assert!(joined);
                assert_eq!(updated.status, OrderStatus::Completed);
                assert_eq!(updated.total_pledge, Money::from(110));
                assert_eq!(updated.total_users, 2);
            },
            other => panic!("Expected accepted pledge, got {other:?}"),
        }
        // In-script cleanup removed the snapshot, but the completion marker tells late pledgers why.
        assert!(cache.fetch_order(&order.order_id).await.unwrap().is_none());
        let second = cache.pledge(&order.order_id, &UserId::fresh(), Money::from(10)).await.unwrap();
        assert_eq!(second, PledgeScriptOutcome::AlreadyComplete);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn concurrent_pledges_complete_exactly_once() {
        let cache = test_cache().await;
        let order = test_order(100, 90);
        cache.store_order(&order, Duration::seconds(60)).await.unwrap();

        let (c1, c2) = (cache.clone(), cache.clone());
        let (id1, id2) = (order.order_id.clone(), order.order_id.clone());
        let (user1, user2) = (UserId::fresh(), UserId::fresh());
        let (r1, r2) = tokio::join!(
            c1.pledge(&id1, &user1, Money::from(60)),
            c2.pledge(&id2, &user2, Money::from(60)),
        );
        let outcomes = [r1.unwrap(), r2.unwrap()];
        let completions = outcomes
            .iter()
            .filter(|o| matches!(o, PledgeScriptOutcome::Accepted { completed: true, .. }))
            .count();
        let refusals =
            outcomes.iter().filter(|o| matches!(o, PledgeScriptOutcome::AlreadyComplete)).count();
        assert_eq!(completions, 1, "exactly one pledge must win the completion race");
        assert_eq!(refusals, 1, "the loser must hear already_complete, not a missing order");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn find_near_filters_by_radius() {
        let cache = test_cache().await;
        let near = test_order(100, 10);
        let mut far = test_order(100, 10);
        far.latitude = 28.7041; // Delhi, ~1700km away
        far.longitude = 77.1025;
        cache.store_order(&near, Duration::seconds(60)).await.unwrap();
        cache.store_order(&far, Duration::seconds(60)).await.unwrap();

        let found = cache.find_near(12.9716, 77.5946, 10.0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, near.order_id);
    }
}
