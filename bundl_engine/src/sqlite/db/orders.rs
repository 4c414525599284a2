use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use crate::{
    db_types::{Order, OrderId, OrderStatus, PledgeMap},
    traits::StorageError,
};

pub async fn insert_order(order: &Order, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let pledge_map = serde_json::to_string(&order.pledge_map)?;
    let result = sqlx::query(
        r#"
        INSERT INTO orders (
            order_id, status, creator_id, amount_needed, pledge_map, total_pledge, total_users,
            platform, latitude, longitude, created_at, updated_at, expires_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, $12)
        "#,
    )
    .bind(&order.order_id)
    .bind(order.status.to_string())
    .bind(&order.creator_id)
    .bind(order.amount_needed)
    .bind(pledge_map)
    .bind(order.total_pledge)
    .bind(order.total_users)
    .bind(&order.platform)
    .bind(order.latitude)
    .bind(order.longitude)
    .bind(order.created_at)
    .bind(order.expires_at)
    .execute(conn)
    .await;
    match result {
        Ok(_) => {
            debug!("📝️ Order {} inserted for creator {}", order.order_id, order.creator_id);
            Ok(())
        },
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(StorageError::OrderAlreadyExists(order.order_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    let row = sqlx::query("SELECT * FROM orders WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    row.map(|r| order_from_row(&r)).transpose()
}

/// Replaces the pledge fields with the snapshot the scripted pledge committed. Last-writer-wins is fine here: the
/// cache has already serialized all concurrent pledges for this order.
pub async fn update_pledges(order: &Order, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    let pledge_map = serde_json::to_string(&order.pledge_map)?;
    let result = sqlx::query(
        r#"
        UPDATE orders SET
            pledge_map = $1,
            total_pledge = $2,
            total_users = $3,
            status = $4,
            updated_at = CURRENT_TIMESTAMP
        WHERE order_id = $5
        "#,
    )
    .bind(pledge_map)
    .bind(order.total_pledge)
    .bind(order.total_users)
    .bind(order.status.to_string())
    .bind(&order.order_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::OrderNotFound(order.order_id.clone()));
    }
    trace!("📝️ Pledge fields updated for order {} (total {})", order.order_id, order.total_pledge);
    Ok(())
}

/// Moves the order from `from` to `to`, returning the updated row. Returns `None` when the row is missing or not in
/// the `from` state, which is what makes expiry idempotent.
pub async fn transition_status(
    order_id: &OrderId,
    from: OrderStatus,
    to: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, StorageError> {
    let row = sqlx::query(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(to.to_string())
    .bind(order_id)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    row.map(|r| order_from_row(&r)).transpose()
}

pub async fn fetch_active_orders(conn: &mut SqliteConnection) -> Result<Vec<Order>, StorageError> {
    let rows = sqlx::query("SELECT * FROM orders WHERE status = 'ACTIVE' ORDER BY created_at ASC")
        .fetch_all(conn)
        .await?;
    rows.iter().map(order_from_row).collect()
}

fn order_from_row(row: &SqliteRow) -> Result<Order, StorageError> {
    let pledge_map: PledgeMap = serde_json::from_str(&row.get::<String, _>("pledge_map"))?;
    Ok(Order {
        order_id: OrderId(row.get("order_id")),
        status: OrderStatus::from(row.get::<String, _>("status")),
        creator_id: row.get::<String, _>("creator_id").into(),
        amount_needed: row.get::<i64, _>("amount_needed").into(),
        pledge_map,
        total_pledge: row.get::<i64, _>("total_pledge").into(),
        total_users: row.get("total_users"),
        platform: row.get("platform"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}
