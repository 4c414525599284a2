use std::fmt::Debug;

use bundl_common::Money;
use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus, UserId},
    engine_api::OrderFlowError,
    events::{EventProducers, OrderEvent, PledgeEvent, PledgeFailedEvent},
    order_objects::{OrderStatusView, PledgeReceipt, ReconcileSummary},
    traits::{CreditLedger, LiveOrderCache, OrderArchive, PledgeScriptOutcome, UserDirectory},
};

/// Engine-level knobs. Every value has a config-file/env counterpart on the server side.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Credits charged per createOrder and per pledgeToOrder
    pub credit_cost_per_action: i64,
    /// Order lifetime when the client does not pick one
    pub default_order_expiry_seconds: i64,
    /// Discovery radius when the client does not pick one
    pub default_search_radius_km: f64,
    pub order_min_amount: Money,
    pub pledge_min_amount: Money,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            credit_cost_per_action: 1,
            default_order_expiry_seconds: 600,
            default_search_radius_km: 5.0,
            order_min_amount: Money::from(1),
            pledge_min_amount: Money::from(1),
        }
    }
}

/// `OrderFlowApi` orchestrates the order lifecycle: creation, pledging, discovery, status reads and expiry.
///
/// It owns the credit charge/refund choreography and the cross-store write order. The invariants it maintains:
/// a mutating action charges exactly one action's worth of credits, or none if it fails; the live cache is
/// authoritative for ACTIVE orders and the durable store for terminal ones; status only ever moves
/// ACTIVE → COMPLETED or ACTIVE → EXPIRED.
pub struct OrderFlowApi<B, C> {
    db: B,
    cache: C,
    settings: EngineSettings,
    producers: EventProducers,
}

impl<B, C> Debug for OrderFlowApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, C> OrderFlowApi<B, C>
where
    B: CreditLedger + UserDirectory + OrderArchive,
    C: LiveOrderCache,
{
    pub fn new(db: B, cache: C, settings: EngineSettings, producers: EventProducers) -> Self {
        Self { db, cache, settings, producers }
    }

    /// Opens a new order.
    ///
    /// The creation credit is debited first so that resource accounting guards the hot path. If the durable insert
    /// fails the credit is refunded; once the row exists, a live-cache failure is *not* refunded because boot-time
    /// reconciliation will re-hydrate the order from the row.
    pub async fn create_order(&self, creator_id: &UserId, new_order: NewOrder) -> Result<Order, OrderFlowError> {
        self.validate_new_order(&new_order)?;
        let ttl_seconds = new_order.ttl_seconds.unwrap_or(self.settings.default_order_expiry_seconds);
        if ttl_seconds <= 0 {
            return Err(OrderFlowError::Validation("expirySeconds must be positive".to_string()));
        }
        let cost = self.settings.credit_cost_per_action;
        if !self.db.try_debit(creator_id, cost).await? {
            debug!("🔄️📦️ createOrder refused for {creator_id}: insufficient credits");
            return Err(OrderFlowError::InsufficientCredits);
        }
        let ttl = Duration::seconds(ttl_seconds);
        let order = new_order.into_order(creator_id.clone(), ttl, Utc::now());
        if let Err(e) = self.db.insert_order(&order).await {
            warn!("🔄️📦️ Could not persist order {}. Refunding creation credit to {creator_id}. {e}", order.order_id);
            self.refund(creator_id, cost).await;
            return Err(e.into());
        }
        self.cache.store_order(&order, ttl).await?;
        debug!(
            "🔄️📦️ Order {} created by {creator_id}: {} needed on {} within {ttl_seconds}s",
            order.order_id, order.amount_needed, order.platform
        );
        self.emit_order_created(&order).await;
        Ok(order)
    }

    /// Adds a pledge to an ACTIVE order.
    ///
    /// The credit is debited before the scripted pledge runs; every refusal path refunds it. A durable-store
    /// failure *after* the script has committed does not refund: the pledge exists in the authoritative live
    /// cache, and the row is repaired lazily.
    pub async fn pledge_to_order(
        &self,
        user_id: &UserId,
        order_id: &OrderId,
        amount: Money,
    ) -> Result<PledgeReceipt, OrderFlowError> {
        if amount < self.settings.pledge_min_amount {
            return Err(OrderFlowError::Validation(format!(
                "pledgeAmount must be at least {}",
                self.settings.pledge_min_amount
            )));
        }
        let cost = self.settings.credit_cost_per_action;
        if !self.db.try_debit(user_id, cost).await? {
            debug!("🔄️💰️ pledgeToOrder refused for {user_id}: insufficient credits");
            return Err(OrderFlowError::InsufficientCredits);
        }
        let outcome = match self.cache.pledge(order_id, user_id, amount).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The script runs as one atomic step; an error reply means it did not commit.
                warn!("🔄️💰️ Pledge script failed for order {order_id}. Refunding {user_id}. {e}");
                self.refund(user_id, cost).await;
                return Err(e.into());
            },
        };
        match outcome {
            PledgeScriptOutcome::NotFound => {
                self.reject_pledge(user_id, order_id, cost, "not_found").await;
                Err(OrderFlowError::OrderNotFound)
            },
            PledgeScriptOutcome::NotActive => {
                self.reject_pledge(user_id, order_id, cost, "not_active").await;
                Err(OrderFlowError::OrderNotActive)
            },
            // The cache distinguishes a completed order from a vanished one on its own (the completion marker is
            // written in the same atomic step that removes the snapshot), so the loser of a completion race always
            // lands here, never in NotFound.
            PledgeScriptOutcome::AlreadyComplete => {
                self.reject_pledge(user_id, order_id, cost, "already_complete").await;
                Err(OrderFlowError::OrderFullyPledged)
            },
            PledgeScriptOutcome::Accepted { order, completed, joined } => {
                trace!(
                    "🔄️💰️ Pledge of {amount} by {user_id} accepted on {order_id} (joined: {joined}, completed: \
                     {completed})"
                );
                if let Err(e) = self.db.update_pledges(&order).await {
                    // The cache is authoritative for live state; reconciliation repairs the row.
                    error!(
                        "🔄️💰️ Pledge on {order_id} committed in the live cache but the durable update failed: {e}"
                    );
                }
                self.emit_pledge_success(&order, user_id).await;
                let phone_numbers = if completed {
                    info!(
                        "🔄️💰️ Order {order_id} COMPLETED at {} of {} with {} participant(s)",
                        order.total_pledge, order.amount_needed, order.total_users
                    );
                    self.emit_order_completed(&order).await;
                    match self.db.phone_numbers_for(&order.participants()).await {
                        Ok(numbers) => Some(numbers),
                        Err(e) => {
                            error!("🔄️💰️ Could not resolve phone numbers for completed order {order_id}: {e}");
                            None
                        },
                    }
                } else {
                    None
                };
                Ok(PledgeReceipt { order, completed, phone_numbers })
            },
        }
    }

    /// Discovery read over the live cache. Possibly stale, never shows terminal orders, costs no credits.
    pub async fn active_orders_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: Option<f64>,
    ) -> Result<Vec<Order>, OrderFlowError> {
        validate_coordinates(latitude, longitude)?;
        let radius = radius_km.unwrap_or(self.settings.default_search_radius_km);
        if !(radius > 0.0) {
            return Err(OrderFlowError::Validation("radiusKm must be positive".to_string()));
        }
        let orders = self.cache.find_near(latitude, longitude, radius).await?;
        trace!("🔄️🔍️ Found {} active order(s) within {radius}km of ({latitude}, {longitude})", orders.len());
        Ok(orders)
    }

    /// A participant's view of one order. Live state is read cache-first (the cache is authoritative while
    /// ACTIVE); non-participants get `OrderNotFound` so the endpoint does not disclose existence.
    pub async fn order_status(
        &self,
        caller: &UserId,
        order_id: &OrderId,
    ) -> Result<OrderStatusView, OrderFlowError> {
        let order = match self.cache.fetch_order(order_id).await? {
            Some(order) => order,
            None => self.db.fetch_order(order_id).await?.ok_or(OrderFlowError::OrderNotFound)?,
        };
        if !order.is_participant(caller) {
            debug!("🔄️🔍️ Hiding order {order_id} from non-participant {caller}");
            return Err(OrderFlowError::OrderNotFound);
        }
        let view = match order.status {
            OrderStatus::Active => {
                OrderStatusView { order: order.redacted_for(caller), phone_numbers: None, credit_refunded: false }
            },
            OrderStatus::Completed => {
                let phone_numbers = self.db.phone_numbers_for(&order.participants()).await?;
                OrderStatusView { order, phone_numbers: Some(phone_numbers), credit_refunded: false }
            },
            OrderStatus::Expired => OrderStatusView { order, phone_numbers: None, credit_refunded: true },
        };
        Ok(view)
    }

    /// Expires an order in response to a TTL notification (or directly from reconciliation).
    ///
    /// Safe to call any number of times: only the invocation that wins the ACTIVE→EXPIRED transition in the
    /// durable store runs the cleanup and the refund fan-out. Per-user refund failures are logged and swallowed so
    /// one bad row cannot block the other participants' refunds.
    pub async fn handle_expiry(&self, order_id: &OrderId) -> Result<(), OrderFlowError> {
        let expired =
            self.db.transition_order_status(order_id, OrderStatus::Active, OrderStatus::Expired).await?;
        let Some(order) = expired else {
            debug!("🕰️ Expiry for {order_id} is a no-op (missing or already terminal)");
            return Ok(());
        };
        if let Err(e) = self.cache.remove_order(order_id).await {
            warn!("🕰️ Could not clean the live cache for expired order {order_id}: {e}");
        }
        let cost = self.settings.credit_cost_per_action;
        for user_id in order.participants() {
            if let Err(e) = self.db.credit(&user_id, cost).await {
                error!("🕰️ Could not refund {cost} credit(s) to {user_id} for expired order {order_id}: {e}");
            }
        }
        info!("🕰️ Order {order_id} EXPIRED. {} participant(s) refunded", order.total_users);
        self.emit_order_expired(&order).await;
        Ok(())
    }

    /// Boot-time reconciliation: every ACTIVE row whose deadline has passed is expired directly (closing the race
    /// where the process died between TTL fire and refund fan-out), the rest are re-hydrated into the live cache
    /// if absent. Per-order failures are logged and do not abort the scan.
    pub async fn reconcile_on_startup(&self) -> Result<ReconcileSummary, OrderFlowError> {
        let active = self.db.fetch_active_orders().await?;
        let now = Utc::now();
        let mut summary = ReconcileSummary::default();
        for order in active {
            let order_id = order.order_id.clone();
            if !order.totals_consistent() {
                warn!("🚦️ Aggregates on order {order_id} disagree with its pledge map");
            }
            if order.expires_at <= now {
                match self.handle_expiry(&order_id).await {
                    Ok(()) => summary.expired += 1,
                    Err(e) => error!("🚦️ Reconciliation could not expire order {order_id}: {e}"),
                }
            } else {
                match self.cache.fetch_order(&order_id).await {
                    Ok(Some(_)) => {},
                    Ok(None) => match self.cache.store_order(&order, order.remaining_lifetime(now)).await {
                        Ok(()) => summary.rehydrated += 1,
                        Err(e) => error!("🚦️ Reconciliation could not re-hydrate order {order_id}: {e}"),
                    },
                    Err(e) => error!("🚦️ Reconciliation could not inspect the cache for order {order_id}: {e}"),
                }
            }
        }
        info!("🚦️ Reconciliation complete: {} re-hydrated, {} expired", summary.rehydrated, summary.expired);
        Ok(summary)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn validate_new_order(&self, new_order: &NewOrder) -> Result<(), OrderFlowError> {
        validate_coordinates(new_order.latitude, new_order.longitude)?;
        if new_order.amount_needed < self.settings.order_min_amount {
            return Err(OrderFlowError::Validation(format!(
                "amountNeeded must be at least {}",
                self.settings.order_min_amount
            )));
        }
        if let Some(pledge) = new_order.initial_pledge {
            if pledge.value() != 0 && pledge < self.settings.pledge_min_amount {
                return Err(OrderFlowError::Validation(format!(
                    "initialPledge must be at least {}",
                    self.settings.pledge_min_amount
                )));
            }
        }
        if new_order.platform.trim().is_empty() {
            return Err(OrderFlowError::Validation("platform must not be empty".to_string()));
        }
        Ok(())
    }

    async fn refund(&self, user_id: &UserId, amount: i64) {
        if let Err(e) = self.db.credit(user_id, amount).await {
            error!("💳️ Could not refund {amount} credit(s) to {user_id}. The ledger is now short: {e}");
        }
    }

    async fn reject_pledge(&self, user_id: &UserId, order_id: &OrderId, cost: i64, reason: &str) {
        debug!("🔄️💰️ Pledge by {user_id} on {order_id} rejected ({reason}). Refunding {cost} credit(s)");
        self.refund(user_id, cost).await;
        self.emit_pledge_failed(order_id, user_id, reason).await;
    }

    async fn emit_order_created(&self, order: &Order) {
        for producer in &self.producers.order_created_producer {
            producer.publish_event(OrderEvent::new(order.clone())).await;
        }
    }

    async fn emit_pledge_success(&self, order: &Order, user_id: &UserId) {
        for producer in &self.producers.pledge_success_producer {
            producer.publish_event(PledgeEvent::new(order.clone(), user_id.clone())).await;
        }
    }

    async fn emit_pledge_failed(&self, order_id: &OrderId, user_id: &UserId, reason: &str) {
        for producer in &self.producers.pledge_failed_producer {
            producer.publish_event(PledgeFailedEvent::new(order_id.clone(), user_id.clone(), reason)).await;
        }
    }

    async fn emit_order_completed(&self, order: &Order) {
        for producer in &self.producers.order_completed_producer {
            producer.publish_event(OrderEvent::new(order.clone())).await;
        }
    }

    async fn emit_order_expired(&self, order: &Order) {
        for producer in &self.producers.order_expired_producer {
            producer.publish_event(OrderEvent::new(order.clone())).await;
        }
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), OrderFlowError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(OrderFlowError::Validation("latitude must be within [-90, 90]".to_string()));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(OrderFlowError::Validation("longitude must be within [-180, 180]".to_string()));
    }
    Ok(())
}
