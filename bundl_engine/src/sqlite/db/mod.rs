pub mod orders;
pub mod users;

use std::str::FromStr;

use log::debug;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

/// Creates the connection pool and brings the schema up to date.
///
/// The schema is applied with `CREATE TABLE IF NOT EXISTS`, so calling this against an existing database is a no-op.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    create_schema(&pool).await?;
    debug!("🗃️ Database pool created for {url}");
    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            phone_number TEXT NOT NULL UNIQUE,
            push_token   TEXT,
            credits      INTEGER NOT NULL DEFAULT 0 CHECK (credits >= 0),
            created_at   TIMESTAMP NOT NULL,
            updated_at   TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id      TEXT PRIMARY KEY,
            status        TEXT NOT NULL DEFAULT 'ACTIVE',
            creator_id    TEXT NOT NULL REFERENCES users (id),
            amount_needed INTEGER NOT NULL,
            pledge_map    TEXT NOT NULL DEFAULT '{}',
            total_pledge  INTEGER NOT NULL DEFAULT 0,
            total_users   INTEGER NOT NULL DEFAULT 0,
            platform      TEXT NOT NULL,
            latitude      REAL NOT NULL,
            longitude     REAL NOT NULL,
            created_at    TIMESTAMP NOT NULL,
            updated_at    TIMESTAMP NOT NULL,
            expires_at    TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);").execute(pool).await?;
    Ok(())
}
