use std::collections::HashMap;

use thiserror::Error;

use crate::db_types::{User, UserId};

/// Identity records: phone numbers, push tokens and first-verification provisioning.
///
/// Phone numbers are globally unique. Users are never deleted.
#[allow(async_fn_in_trait)]
pub trait UserDirectory {
    async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, UserDirectoryError>;

    async fn fetch_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, UserDirectoryError>;

    /// Returns the user for the given phone number, creating the record with `starting_credits` on first sight.
    async fn create_or_fetch_user(&self, phone_number: &str, starting_credits: i64)
        -> Result<User, UserDirectoryError>;

    async fn update_push_token(&self, user_id: &UserId, push_token: &str) -> Result<(), UserDirectoryError>;

    /// Resolves phone numbers for the given users. Unknown ids are silently absent from the result.
    async fn phone_numbers_for(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, String>, UserDirectoryError>;

    /// Resolves push tokens for the given users. Users without a token are skipped.
    async fn push_tokens_for(&self, user_ids: &[UserId]) -> Result<Vec<String>, UserDirectoryError>;
}

#[derive(Debug, Error)]
pub enum UserDirectoryError {
    #[error("User {0} does not exist")]
    UserNotFound(UserId),
    #[error("Phone number {0} is already linked to another user")]
    DuplicatePhoneNumber(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for UserDirectoryError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
