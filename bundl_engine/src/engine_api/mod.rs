//! The engine's public APIs: order-lifecycle orchestration and credit/identity access.
mod errors;
mod ledger_api;
mod order_flow_api;

pub use errors::OrderFlowError;
pub use ledger_api::LedgerApi;
pub use order_flow_api::{EngineSettings, OrderFlowApi};
