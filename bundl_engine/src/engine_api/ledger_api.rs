//! Unified API for credit balances and identity records.
use std::fmt::Debug;

use log::debug;

use crate::{
    db_types::{User, UserId},
    traits::{CreditLedger, LedgerError, UserDirectory, UserDirectoryError},
};

/// Thin front over the ledger and directory traits for the read/identity endpoints.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B>
where B: CreditLedger + UserDirectory
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        self.db.balance(user_id).await
    }

    pub async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, UserDirectoryError> {
        self.db.fetch_user(user_id).await
    }

    /// Called once a phone number has been verified: returns the user record, creating it with the configured
    /// starting balance on first verification.
    pub async fn register_verified_user(
        &self,
        phone_number: &str,
        starting_credits: i64,
    ) -> Result<User, UserDirectoryError> {
        let user = self.db.create_or_fetch_user(phone_number, starting_credits).await?;
        debug!("🧑️ Verified phone number resolves to user {}", user.user_id);
        Ok(user)
    }

    pub async fn update_push_token(&self, user_id: &UserId, push_token: &str) -> Result<(), UserDirectoryError> {
        self.db.update_push_token(user_id, push_token).await
    }
}
