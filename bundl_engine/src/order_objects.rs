//! Result objects handed back by the engine API.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db_types::{Order, UserId};

/// Outcome of a successful pledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeReceipt {
    #[serde(flatten)]
    pub order: Order,
    /// This pledge tipped the order over its threshold.
    pub completed: bool,
    /// Phone numbers of all participants, present only on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_numbers: Option<HashMap<UserId, String>>,
}

/// A participant's view of an order, redacted according to its status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusView {
    #[serde(flatten)]
    pub order: Order,
    /// Present when the order is COMPLETED: the contact details that let the group settle up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_numbers: Option<HashMap<UserId, String>>,
    /// Set on EXPIRED orders: the participation credit has been returned.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub credit_refunded: bool,
}

/// What boot-time reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// ACTIVE orders whose deadline had not passed and were put back into the live cache.
    pub rehydrated: usize,
    /// ACTIVE orders whose deadline had passed and were expired directly.
    pub expired: usize,
}
