//! Interface contracts between the order engine and its backends.
//!
//! The engine is backend-agnostic: everything it needs from the outside world is expressed as a trait here.
//!
//! * [`CreditLedger`]: per-user credit balances with an atomic conditional debit.
//! * [`UserDirectory`]: identity records: phone numbers, push tokens, provisioning on first verification.
//! * [`OrderArchive`]: the durable order store, authoritative for terminal state.
//! * [`LiveOrderCache`]: the in-memory working copy of ACTIVE orders, host of the scripted pledge.
//! * [`OtpProvider`] / [`PushSender`]: external capabilities the engine consumes and emits.
mod capabilities;
mod ledger;
mod live_cache;
mod order_archive;
mod user_directory;

pub use capabilities::{OtpError, OtpProvider, PushSender};
pub use ledger::{CreditLedger, LedgerError};
pub use live_cache::{CacheError, LiveOrderCache, PledgeScriptOutcome};
pub use order_archive::{OrderArchive, StorageError};
pub use user_directory::{UserDirectory, UserDirectoryError};
