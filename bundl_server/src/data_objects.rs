use std::fmt::Display;

use bundl_common::Money;
use bundl_engine::db_types::{NewOrder, OrderId, User};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Body of `POST /orders/createOrder`. Amounts are whole currency units; fractional values are rejected at the
/// deserialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderParams {
    pub amount_needed: i64,
    pub platform: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub initial_pledge: Option<i64>,
    #[serde(default)]
    pub expiry_seconds: Option<i64>,
}

impl CreateOrderParams {
    pub fn into_new_order(self) -> NewOrder {
        let mut order = NewOrder::new(Money::from(self.amount_needed), self.platform, self.latitude, self.longitude);
        if let Some(pledge) = self.initial_pledge {
            order = order.with_initial_pledge(Money::from(pledge));
        }
        if let Some(ttl) = self.expiry_seconds {
            order = order.with_ttl_seconds(ttl);
        }
        order
    }
}

/// Body of `POST /orders/pledgeToOrder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PledgeOrderParams {
    pub order_id: OrderId,
    pub pledge_amount: i64,
}

/// Query of `GET /orders/activeOrders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrdersQuery {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub radius_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpParams {
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpResponse {
    pub tid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpParams {
    pub tid: String,
    pub otp: String,
    /// Push delivery handle, stored on verification when present
    #[serde(default)]
    pub fcm_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePushTokenParams {
    pub push_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub credits: i64,
}
