use std::collections::HashMap;

use bundl_engine::{
    db_types::{User, UserId},
    traits::{CreditLedger, LedgerError, UserDirectory, UserDirectoryError},
};
use mockall::mock;

mock! {
    pub Backend {}

    impl CreditLedger for Backend {
        async fn try_debit(&self, user_id: &UserId, amount: i64) -> Result<bool, LedgerError>;
        async fn credit(&self, user_id: &UserId, amount: i64) -> Result<(), LedgerError>;
        async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError>;
    }

    impl UserDirectory for Backend {
        async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, UserDirectoryError>;
        async fn fetch_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, UserDirectoryError>;
        async fn create_or_fetch_user(
            &self,
            phone_number: &str,
            starting_credits: i64,
        ) -> Result<User, UserDirectoryError>;
        async fn update_push_token(&self, user_id: &UserId, push_token: &str) -> Result<(), UserDirectoryError>;
        async fn phone_numbers_for(
            &self,
            user_ids: &[UserId],
        ) -> Result<HashMap<UserId, String>, UserDirectoryError>;
        async fn push_tokens_for(&self, user_ids: &[UserId]) -> Result<Vec<String>, UserDirectoryError>;
    }
}
