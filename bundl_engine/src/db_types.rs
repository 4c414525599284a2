//! Core data types shared by the durable store, the live cache and the engine API.
//!
//! The wire shape of these types matters: [`Order`] serializes to the same camelCase JSON in HTTP responses and in
//! the live cache, and the scripted pledge mutates that JSON server-side. Renaming a field here means changing the
//! pledge script too.
use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use bundl_common::Money;
use chrono::{DateTime, Duration, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use uuid::Uuid;

//--------------------------------------        UserId        --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Mints a fresh, globally unique user id.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UserId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------      OrderStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// The order is live: it sits in the cache and geo-index and accepts pledges.
    #[serde(rename = "ACTIVE")]
    Active,
    /// The pledge total reached the threshold. Terminal.
    #[serde(rename = "COMPLETED")]
    Completed,
    /// The TTL elapsed before the threshold was reached. Terminal.
    #[serde(rename = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Expired)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Active => write!(f, "ACTIVE"),
            OrderStatus::Completed => write!(f, "COMPLETED"),
            OrderStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Active");
            OrderStatus::Active
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct ConversionError(String);

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "EXPIRED" => Ok(Self::Expired),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------       PledgeMap       -------------------------------------------------------
/// Per-user pledged amounts. Repeated pledges by the same user accumulate under a single key.
pub type PledgeMap = BTreeMap<UserId, Money>;

//--------------------------------------         Order         -------------------------------------------------------
/// A group order: the snapshot held in the live cache while ACTIVE, and the authoritative row in the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "id")]
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub creator_id: UserId,
    pub amount_needed: Money,
    pub pledge_map: PledgeMap,
    pub total_pledge: Money,
    pub total_users: i64,
    pub platform: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Order {
    pub fn is_participant(&self, user_id: &UserId) -> bool {
        self.pledge_map.contains_key(user_id)
    }

    /// The distinct users charged for this order, in key order. Creator included iff they pledged.
    pub fn participants(&self) -> Vec<UserId> {
        self.pledge_map.keys().cloned().collect()
    }

    /// Time left before the TTL elapses. Negative once the deadline has passed.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// True when the aggregate fields agree with the pledge map. Every write path folds the aggregates in together
    /// with the map, so a mismatch means the record is corrupt.
    pub fn totals_consistent(&self) -> bool {
        self.total_pledge == self.pledge_map.values().copied().sum::<Money>()
            && self.total_users == self.pledge_map.len() as i64
    }

    /// Strips every pledge entry except the caller's own. Used for ACTIVE orders so that a participant cannot see
    /// who else has joined before the order settles.
    pub fn redacted_for(mut self, user_id: &UserId) -> Self {
        self.pledge_map.retain(|k, _| k == user_id);
        self
    }
}

//--------------------------------------       NewOrder        -------------------------------------------------------
/// Parameters for opening an order. Turned into a full [`Order`] by the engine once the creation credit clears.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The pledge threshold that completes the order
    pub amount_needed: Money,
    /// Free-form tag for the delivery platform the order targets (e.g. "zomato")
    pub platform: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Amount the creator pledges upfront, if any
    pub initial_pledge: Option<Money>,
    /// Lifetime of the order; the engine default applies when omitted
    pub ttl_seconds: Option<i64>,
}

impl NewOrder {
    pub fn new(amount_needed: Money, platform: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self { amount_needed, platform: platform.into(), latitude, longitude, initial_pledge: None, ttl_seconds: None }
    }

    pub fn with_initial_pledge(mut self, pledge: Money) -> Self {
        self.initial_pledge = Some(pledge);
        self
    }

    pub fn with_ttl_seconds(mut self, ttl: i64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }

    /// Builds the ACTIVE order record, seeding the pledge map with the creator's initial pledge when present.
    pub fn into_order(self, creator_id: UserId, ttl: Duration, now: DateTime<Utc>) -> Order {
        let mut pledge_map = PledgeMap::new();
        let mut total_pledge = Money::default();
        let mut total_users = 0;
        if let Some(pledge) = self.initial_pledge.filter(|p| p.is_positive()) {
            pledge_map.insert(creator_id.clone(), pledge);
            total_pledge = pledge;
            total_users = 1;
        }
        Order {
            order_id: OrderId::fresh(),
            status: OrderStatus::Active,
            creator_id,
            amount_needed: self.amount_needed,
            pledge_map,
            total_pledge,
            total_users,
            platform: self.platform,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: now,
            expires_at: now + ttl,
        }
    }
}

//--------------------------------------         User          -------------------------------------------------------
/// An identity record. Created on first successful phone verification, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[sqlx(rename = "id")]
    #[serde(rename = "id")]
    pub user_id: UserId,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_order() -> Order {
        let creator = UserId("creator".to_string());
        NewOrder::new(Money::from(100), "zomato", 12.9716, 77.5946)
            .with_initial_pledge(Money::from(40))
            .into_order(creator, Duration::seconds(600), Utc::now())
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [OrderStatus::Active, OrderStatus::Completed, OrderStatus::Expired] {
            assert_eq!(status.to_string().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("Paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn new_order_seeds_creator_pledge() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Active);
        assert_eq!(order.total_pledge, Money::from(40));
        assert_eq!(order.total_users, 1);
        assert!(order.is_participant(&UserId("creator".to_string())));
        assert!(order.totals_consistent());
    }

    #[test]
    fn mismatched_aggregates_are_detected() {
        let mut order = sample_order();
        order.total_pledge = Money::from(41);
        assert!(!order.totals_consistent());
        let mut order = sample_order();
        order.total_users = 2;
        assert!(!order.totals_consistent());
    }

    #[test]
    fn redaction_keeps_only_the_caller() {
        let mut order = sample_order();
        order.pledge_map.insert(UserId("other".to_string()), Money::from(30));
        let redacted = order.redacted_for(&UserId("other".to_string()));
        assert_eq!(redacted.pledge_map.len(), 1);
        assert!(redacted.pledge_map.contains_key(&UserId("other".to_string())));
    }

    #[test]
    fn order_serializes_with_wire_field_names() {
        let order = sample_order();
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("id").is_some());
        assert!(json.get("amountNeeded").is_some());
        assert!(json.get("pledgeMap").is_some());
        assert!(json.get("totalPledge").is_some());
        assert!(json.get("totalUsers").is_some());
        assert_eq!(json["status"], "ACTIVE");
    }
}
