use std::{collections::HashMap, fmt::Debug};

use sqlx::SqlitePool;

use super::db::{new_pool, orders, users};
use crate::{
    db_types::{Order, OrderId, OrderStatus, User, UserId},
    traits::{CreditLedger, LedgerError, OrderArchive, StorageError, UserDirectory, UserDirectoryError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database at `url`, creating the file and schema as needed.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl CreditLedger for SqliteDatabase {
    async fn try_debit(&self, user_id: &UserId, amount: i64) -> Result<bool, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        users::try_debit(user_id, amount, &mut conn).await
    }

    async fn credit(&self, user_id: &UserId, amount: i64) -> Result<(), LedgerError> {
        let mut conn = self.pool.acquire().await?;
        users::credit(user_id, amount, &mut conn).await
    }

    async fn balance(&self, user_id: &UserId) -> Result<i64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        users::balance(user_id, &mut conn).await
    }
}

impl UserDirectory for SqliteDatabase {
    async fn fetch_user(&self, user_id: &UserId) -> Result<Option<User>, UserDirectoryError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_user_by_id(user_id, &mut conn).await
    }

    async fn fetch_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, UserDirectoryError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_user_by_phone(phone_number, &mut conn).await
    }

    async fn create_or_fetch_user(
        &self,
        phone_number: &str,
        starting_credits: i64,
    ) -> Result<User, UserDirectoryError> {
        let mut conn = self.pool.acquire().await?;
        users::create_or_fetch_user(phone_number, starting_credits, &mut conn).await
    }

    async fn update_push_token(&self, user_id: &UserId, push_token: &str) -> Result<(), UserDirectoryError> {
        let mut conn = self.pool.acquire().await?;
        users::update_push_token(user_id, push_token, &mut conn).await
    }

    async fn phone_numbers_for(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, String>, UserDirectoryError> {
        let mut conn = self.pool.acquire().await?;
        users::phone_numbers_for(user_ids, &mut conn).await
    }

    async fn push_tokens_for(&self, user_ids: &[UserId]) -> Result<Vec<String>, UserDirectoryError> {
        let mut conn = self.pool.acquire().await?;
        users::push_tokens_for(user_ids, &mut conn).await
    }
}

impl OrderArchive for SqliteDatabase {
    async fn insert_order(&self, order: &Order) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn update_pledges(&self, order: &Order) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_pledges(order, &mut conn).await
    }

    async fn transition_order_status(
        &self,
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::transition_status(order_id, from, to, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(order_id, &mut conn).await
    }

    async fn fetch_active_orders(&self) -> Result<Vec<Order>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_active_orders(&mut conn).await
    }
}
