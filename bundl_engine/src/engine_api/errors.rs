use thiserror::Error;

use crate::{
    db_types::UserId,
    traits::{CacheError, LedgerError, StorageError, UserDirectoryError},
};

/// The engine's error taxonomy. The HTTP layer maps these onto status codes; store-level detail never leaks to
/// callers.
#[derive(Debug, Error)]
pub enum OrderFlowError {
    #[error("Insufficient credits")]
    InsufficientCredits,
    #[error("Order not found")]
    OrderNotFound,
    #[error("Order is no longer active")]
    OrderNotActive,
    #[error("Order has already been fully pledged")]
    OrderFullyPledged,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("User {0} does not exist")]
    UserNotFound(UserId),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Live cache error: {0}")]
    CacheError(#[from] CacheError),
    #[error("Ledger error: {0}")]
    LedgerError(String),
}

impl From<LedgerError> for OrderFlowError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::UserNotFound(user_id) => Self::UserNotFound(user_id),
            LedgerError::DatabaseError(msg) => Self::LedgerError(msg),
        }
    }
}

impl From<UserDirectoryError> for OrderFlowError {
    fn from(e: UserDirectoryError) -> Self {
        match e {
            UserDirectoryError::UserNotFound(user_id) => Self::UserNotFound(user_id),
            UserDirectoryError::DuplicatePhoneNumber(msg) => Self::Validation(msg),
            UserDirectoryError::DatabaseError(msg) => Self::LedgerError(msg),
        }
    }
}
