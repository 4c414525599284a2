use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bundl_common::Money;
use chrono::{DateTime, Duration, Utc};
use log::trace;

use crate::{
    db_types::{Order, OrderId, OrderStatus, UserId},
    traits::{CacheError, LiveOrderCache, PledgeScriptOutcome},
};

struct StoredOrder {
    order: Order,
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderId, StoredOrder>,
    /// Completion markers, deadline-bound like their snapshots were. A pledge that finds no snapshot but a live
    /// marker lost a completion race and must be told so.
    completed: HashMap<OrderId, DateTime<Utc>>,
}

impl MemoryState {
    fn live_order(&mut self, order_id: &OrderId) -> Option<Order> {
        match self.orders.get(order_id) {
            Some(stored) if stored.deadline > Utc::now() => Some(stored.order.clone()),
            Some(_) => {
                self.orders.remove(order_id);
                None
            },
            None => None,
        }
    }

    fn recently_completed(&mut self, order_id: &OrderId) -> bool {
        match self.completed.get(order_id) {
            Some(deadline) if *deadline > Utc::now() => true,
            Some(_) => {
                self.completed.remove(order_id);
                false
            },
            None => false,
        }
    }
}

/// An in-process live cache with the same contract as the Redis implementation.
///
/// A single mutex guards every mutation, so each pledge observes a consistent snapshot and commits in one step,
/// which is the "per-order single-threaded actor" strategy. Expired entries are dropped lazily on access; there is no
/// expiration pub/sub here, so deployments using this cache drive expiry from the durable store's deadlines alone.
#[derive(Clone, Default)]
pub struct MemoryOrderCache {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryOrderCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LiveOrderCache for MemoryOrderCache {
    async fn store_order(&self, order: &Order, ttl: Duration) -> Result<(), CacheError> {
        let mut state = self.inner.lock().expect("live cache mutex poisoned");
        state
            .orders
            .insert(order.order_id.clone(), StoredOrder { order: order.clone(), deadline: Utc::now() + ttl });
        trace!("📦️ Order {} stored in memory cache", order.order_id);
        Ok(())
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, CacheError> {
        let mut state = self.inner.lock().expect("live cache mutex poisoned");
        Ok(state.live_order(order_id))
    }

    async fn remove_order(&self, order_id: &OrderId) -> Result<(), CacheError> {
        let mut state = self.inner.lock().expect("live cache mutex poisoned");
        state.orders.remove(order_id);
        Ok(())
    }

    async fn pledge(
        &self,
        order_id: &OrderId,
        user_id: &UserId,
        amount: Money,
    ) -> Result<PledgeScriptOutcome, CacheError> {
        let mut state = self.inner.lock().expect("live cache mutex poisoned");
        let Some(mut order) = state.live_order(order_id) else {
            if state.recently_completed(order_id) {
                return Ok(PledgeScriptOutcome::AlreadyComplete);
            }
            return Ok(PledgeScriptOutcome::NotFound);
        };
        if order.status != OrderStatus::Active {
            return Ok(PledgeScriptOutcome::NotActive);
        }
        if order.total_pledge >= order.amount_needed {
            return Ok(PledgeScriptOutcome::AlreadyComplete);
        }
        let joined = !order.pledge_map.contains_key(user_id);
        *order.pledge_map.entry(user_id.clone()).or_default() += amount;
        order.total_pledge = order.total_pledge + amount;
        if joined {
            order.total_users += 1;
        }
        let completed = order.total_pledge >= order.amount_needed;
        if completed {
            order.status = OrderStatus::Completed;
            // The marker outlives the snapshot for as long as the order would have, same as the Redis script.
            if let Some(stored) = state.orders.remove(order_id) {
                state.completed.insert(order_id.clone(), stored.deadline);
            }
        } else if let Some(stored) = state.orders.get_mut(order_id) {
            stored.order = order.clone();
        }
        Ok(PledgeScriptOutcome::Accepted { order, completed, joined })
    }

    async fn find_near(&self, latitude: f64, longitude: f64, radius_km: f64) -> Result<Vec<Order>, CacheError> {
        let state = self.inner.lock().expect("live cache mutex poisoned");
        let now = Utc::now();
        let orders = state
            .orders
            .values()
            .filter(|stored| stored.deadline > now && stored.order.status == OrderStatus::Active)
            .filter(|stored| {
                haversine_km(latitude, longitude, stored.order.latitude, stored.order.longitude) <= radius_km
            })
            .map(|stored| stored.order.clone())
            .collect();
        Ok(orders)
    }
}

/// Great-circle distance between two coordinates, in kilometers.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::NewOrder;

    fn test_order(amount_needed: i64, initial: i64) -> Order {
        NewOrder::new(Money::from(amount_needed), "zomato", 12.9716, 77.5946)
            .with_initial_pledge(Money::from(initial))
            .into_order(UserId::fresh(), Duration::seconds(600), Utc::now())
    }

    #[test]
    fn haversine_sanity() {
        // Bangalore to Delhi is roughly 1750km
        let d = haversine_km(12.9716, 77.5946, 28.7041, 77.1025);
        assert!((1700.0..1800.0).contains(&d), "unexpected distance {d}");
        assert!(haversine_km(12.9716, 77.5946, 12.9716, 77.5946) < 1e-9);
    }

    #[tokio::test]
    async fn repeated_pledges_accumulate_without_inflating_users() {
        let cache = MemoryOrderCache::new();
        let order = test_order(100, 0);
        cache.store_order(&order, Duration::seconds(600)).await.unwrap();
        let user = UserId::fresh();

        let first = cache.pledge(&order.order_id, &user, Money::from(10)).await.unwrap();
        let PledgeScriptOutcome::Accepted { order: after_first, joined, .. } = first else {
            panic!("pledge refused")
        };
        assert!(joined);
        assert_eq!(after_first.total_users, 1);

        let second = cache.pledge(&order.order_id, &user, Money::from(15)).await.unwrap();
        let PledgeScriptOutcome::Accepted { order: after_second, joined, completed } = second else {
            panic!("pledge refused")
        };
        assert!(!joined);
        assert!(!completed);
        assert_eq!(after_second.total_users, 1);
        assert_eq!(after_second.pledge_map[&user], Money::from(25));
        assert_eq!(after_second.total_pledge, Money::from(25));
    }

    #[tokio::test]
    async fn completion_removes_the_snapshot_and_leaves_a_marker() {
        let cache = MemoryOrderCache::new();
        let order = test_order(100, 40);
        cache.store_order(&order, Duration::seconds(600)).await.unwrap();

        let outcome = cache.pledge(&order.order_id, &UserId::fresh(), Money::from(70)).await.unwrap();
        assert!(matches!(outcome, PledgeScriptOutcome::Accepted { completed: true, .. }));
        assert!(cache.fetch_order(&order.order_id).await.unwrap().is_none());
        assert!(cache.find_near(12.9716, 77.5946, 10.0).await.unwrap().is_empty());
        // A pledge losing the completion race must not be told the order never existed.
        let late = cache.pledge(&order.order_id, &UserId::fresh(), Money::from(10)).await.unwrap();
        assert_eq!(late, PledgeScriptOutcome::AlreadyComplete);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = MemoryOrderCache::new();
        let order = test_order(100, 10);
        cache.store_order(&order, Duration::seconds(-1)).await.unwrap();
        assert!(cache.fetch_order(&order.order_id).await.unwrap().is_none());
        let outcome = cache.pledge(&order.order_id, &UserId::fresh(), Money::from(10)).await.unwrap();
        assert_eq!(outcome, PledgeScriptOutcome::NotFound);
    }

    #[tokio::test]
    async fn find_near_respects_radius() {
        let cache = MemoryOrderCache::new();
        let near = test_order(100, 10);
        let mut far = test_order(100, 10);
        far.latitude = 28.7041;
        far.longitude = 77.1025;
        cache.store_order(&near, Duration::seconds(600)).await.unwrap();
        cache.store_order(&far, Duration::seconds(600)).await.unwrap();

        let found = cache.find_near(12.9716, 77.5946, 10.0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].order_id, near.order_id);
    }
}
