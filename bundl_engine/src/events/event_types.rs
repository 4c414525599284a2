use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, UserId};

/// Carries a full order snapshot. Used for created, completed and expired notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order: Order,
}

impl OrderEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// A pledge that was accepted by the live cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PledgeEvent {
    pub order: Order,
    pub user_id: UserId,
}

impl PledgeEvent {
    pub fn new(order: Order, user_id: UserId) -> Self {
        Self { order, user_id }
    }
}

/// A pledge the cache refused. The credit has already been refunded when this fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeFailedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reason: String,
}

impl PledgeFailedEvent {
    pub fn new(order_id: OrderId, user_id: UserId, reason: impl Into<String>) -> Self {
        Self { order_id, user_id, reason: reason.into() }
    }
}
