//! Bundl Order Engine
//!
//! The core of the Bundl group-order backend. A group order is a pending delivery that needs pledges to reach a
//! monetary threshold before its TTL elapses: reaching the threshold completes the order and reveals the
//! participants' phone numbers, while expiry refunds every participant's entry credit.
//!
//! The library is divided into three main sections:
//! 1. Durable storage: the SQLite backend behind the [`traits`] seams holds users, credit balances and the
//!    authoritative order rows. You should never need to touch the database directly; go through the engine APIs.
//! 2. The live side: ACTIVE orders live in a TTL-bound, geo-indexed cache ([`live`]) where all pledge mutation
//!    happens as a single server-side step, and an expiry watcher turns key expirations into engine events.
//! 3. Orchestration: [`OrderFlowApi`] drives the lifecycle and owns the credit charge/refund choreography.
//!
//! The engine also emits lifecycle events (order created, pledge accepted/refused, completed, expired) through a
//! small hook system so integrations such as the push dispatcher can react without gating correctness.
pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod live;
pub mod order_objects;
mod sqlite;
pub mod traits;

pub use engine_api::{EngineSettings, LedgerApi, OrderFlowApi, OrderFlowError};
pub use sqlite::SqliteDatabase;
