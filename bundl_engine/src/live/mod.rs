//! The live side of the engine: the cache that owns ACTIVE orders and the watcher that reacts to their TTLs.
//!
//! [`RedisOrderCache`] is the production implementation (Redis: TTLs, geo index, sets, and the Lua scripted pledge).
//! [`MemoryOrderCache`] is an in-process stand-in with the same atomicity contract, used by the engine test suite
//! and single-node development setups. [`ExpiryWatcher`] subscribes to key-expiration notifications and feeds order
//! ids into the engine's expiry queue.
mod expiry_watcher;
mod keys;
mod memory;
mod redis_cache;

pub use expiry_watcher::{ExpiryWatcher, DEFAULT_EXPIRY_CHANNEL};
pub use keys::KeyFamily;
pub use memory::MemoryOrderCache;
pub use redis_cache::RedisOrderCache;
