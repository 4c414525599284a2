use std::collections::HashMap;

use chrono::Utc;
use log::{debug, trace};
use sqlx::{QueryBuilder, Row, SqliteConnection};

use crate::{
    db_types::{User, UserId},
    traits::{LedgerError, UserDirectoryError},
};

pub async fn fetch_user_by_id(
    user_id: &UserId,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, UserDirectoryError> {
    let user = sqlx::query_as(
        "SELECT id, phone_number, push_token, credits, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

pub async fn fetch_user_by_phone(
    phone_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, UserDirectoryError> {
    let user = sqlx::query_as(
        "SELECT id, phone_number, push_token, credits, created_at, updated_at FROM users WHERE phone_number = $1",
    )
    .bind(phone_number)
    .fetch_optional(conn)
    .await?;
    Ok(user)
}

/// Fetches the user for the given phone number, creating the record on first sight. The insert races benignly with
/// concurrent verifications of the same number: the loser of the unique-constraint race re-reads the winner's row.
pub async fn create_or_fetch_user(
    phone_number: &str,
    starting_credits: i64,
    conn: &mut SqliteConnection,
) -> Result<User, UserDirectoryError> {
    if let Some(user) = fetch_user_by_phone(phone_number, &mut *conn).await? {
        trace!("🧑️ Phone number is already registered to user {}", user.user_id);
        return Ok(user);
    }
    let user_id = UserId::fresh();
    let now = Utc::now();
    let inserted = sqlx::query_as(
        r#"
        INSERT INTO users (id, phone_number, push_token, credits, created_at, updated_at)
        VALUES ($1, $2, NULL, $3, $4, $4)
        RETURNING id, phone_number, push_token, credits, created_at, updated_at
        "#,
    )
    .bind(&user_id)
    .bind(phone_number)
    .bind(starting_credits)
    .bind(now)
    .fetch_one(&mut *conn)
    .await;
    match inserted {
        Ok(user) => {
            debug!("🧑️ Created new user {user_id} with {starting_credits} starting credits");
            Ok(user)
        },
        Err(e) if is_unique_violation(&e) => fetch_user_by_phone(phone_number, conn)
            .await?
            .ok_or_else(|| UserDirectoryError::DuplicatePhoneNumber(phone_number.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn update_push_token(
    user_id: &UserId,
    push_token: &str,
    conn: &mut SqliteConnection,
) -> Result<(), UserDirectoryError> {
    let result =
        sqlx::query("UPDATE users SET push_token = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
            .bind(push_token)
            .bind(user_id)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(UserDirectoryError::UserNotFound(user_id.clone()));
    }
    debug!("🧑️ Updated push token for user {user_id}");
    Ok(())
}

pub async fn phone_numbers_for(
    user_ids: &[UserId],
    conn: &mut SqliteConnection,
) -> Result<HashMap<UserId, String>, UserDirectoryError> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut builder = QueryBuilder::new("SELECT id, phone_number FROM users WHERE id IN (");
    let mut ids = builder.separated(", ");
    for user_id in user_ids {
        ids.push_bind(user_id);
    }
    builder.push(")");
    let rows = builder.build().fetch_all(conn).await?;
    let numbers = rows
        .into_iter()
        .map(|row| (UserId(row.get("id")), row.get::<String, _>("phone_number")))
        .collect::<HashMap<UserId, String>>();
    Ok(numbers)
}

pub async fn push_tokens_for(
    user_ids: &[UserId],
    conn: &mut SqliteConnection,
) -> Result<Vec<String>, UserDirectoryError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::new("SELECT push_token FROM users WHERE push_token IS NOT NULL AND id IN (");
    let mut ids = builder.separated(", ");
    for user_id in user_ids {
        ids.push_bind(user_id);
    }
    builder.push(")");
    let rows = builder.build().fetch_all(conn).await?;
    let tokens = rows.into_iter().map(|row| row.get::<String, _>("push_token")).collect();
    Ok(tokens)
}

//--------------------------------------     Credit ledger     -------------------------------------------------------

/// Conditionally debits the balance in a single statement. The `credits >= $1` guard and SQLite's row-level write
/// serialization make this the at-most-once debit point for the whole engine.
pub async fn try_debit(user_id: &UserId, amount: i64, conn: &mut SqliteConnection) -> Result<bool, LedgerError> {
    let result = sqlx::query(
        "UPDATE users SET credits = credits - $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND credits >= $1",
    )
    .bind(amount)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        trace!("💳️ Debited {amount} credit(s) from user {user_id}");
        return Ok(true);
    }
    // No row updated: either the balance was too low, or the user does not exist at all.
    let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    match exists {
        Some(_) => {
            debug!("💳️ Debit of {amount} credit(s) refused for user {user_id}: insufficient balance");
            Ok(false)
        },
        None => Err(LedgerError::UserNotFound(user_id.clone())),
    }
}

pub async fn credit(user_id: &UserId, amount: i64, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let result =
        sqlx::query("UPDATE users SET credits = credits + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
            .bind(amount)
            .bind(user_id)
            .execute(conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::UserNotFound(user_id.clone()));
    }
    trace!("💳️ Credited {amount} credit(s) to user {user_id}");
    Ok(())
}

pub async fn balance(user_id: &UserId, conn: &mut SqliteConnection) -> Result<i64, LedgerError> {
    let row = sqlx::query("SELECT credits FROM users WHERE id = $1").bind(user_id).fetch_optional(conn).await?;
    match row {
        Some(row) => Ok(row.get("credits")),
        None => Err(LedgerError::UserNotFound(user_id.clone())),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}
