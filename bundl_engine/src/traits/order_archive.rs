use thiserror::Error;

use crate::db_types::{Order, OrderId, OrderStatus};

/// The durable order store. Authoritative for terminal state; while an order is ACTIVE the live cache holds the
/// working copy and this store trails it.
#[allow(async_fn_in_trait)]
pub trait OrderArchive {
    /// Creates the order row. The order must not already exist.
    async fn insert_order(&self, order: &Order) -> Result<(), StorageError>;

    /// Replaces the mutable pledge fields (`pledge_map`, `total_pledge`, `total_users`, `status`) with the values
    /// carried by `order`. Called after a successful scripted pledge; concurrent writers are already serialized by
    /// the cache, so last-writer-wins is acceptable here.
    async fn update_pledges(&self, order: &Order) -> Result<(), StorageError>;

    /// Transitions the order from `from` to `to` and returns the updated row, or `None` when the order is missing or
    /// not in the `from` state. This is the idempotence gate for expiry: only the invocation that wins the
    /// ACTIVE→EXPIRED transition runs the refund fan-out.
    async fn transition_order_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, StorageError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError>;

    /// All orders still marked ACTIVE, oldest first. Used by boot-time reconciliation.
    async fn fetch_active_orders(&self) -> Result<Vec<Order>, StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Stored order is corrupt: {0}")]
    CorruptRecord(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::CorruptRecord(e.to_string())
    }
}
