use thiserror::Error;

use crate::db_types::UserId;

/// The credit ledger tracks the per-user integer balance the engine charges for mutating actions.
///
/// Debits and credits on the same user must serialize with respect to each other; a failed
/// [`try_debit`](CreditLedger::try_debit) means no credit was taken.
#[allow(async_fn_in_trait)]
pub trait CreditLedger {
    /// Atomically decrement the balance if it is at least `amount`. Returns `false`, without side effect, when the
    /// balance is too low.
    async fn try_debit(&self, user_id: &UserId, amount: i64) -> Result<bool, LedgerError>;

    /// Atomically increment the balance. Only fails for a user that does not exist, which indicates an internal bug.
    async fn credit(&self, user_id: &UserId, amount: i64) -> Result<(), LedgerError>;

    /// Read-only balance lookup. May be weakly consistent with in-flight debits.
    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("User {0} does not exist")]
    UserNotFound(UserId),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
