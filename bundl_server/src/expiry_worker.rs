use bundl_engine::{db_types::OrderId, live::RedisOrderCache, OrderFlowApi, SqliteDatabase};
use log::*;
use tokio::{sync::mpsc, task::JoinHandle};

/// Starts the engine-side expiry consumer: every order id the watcher puts on the queue is run through
/// `handleExpiry`. Do not await the returned JoinHandle, as it runs until the queue closes.
pub fn start_expiry_worker(
    api: OrderFlowApi<SqliteDatabase, RedisOrderCache>,
    mut queue: mpsc::Receiver<OrderId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🕰️ Expiry worker started");
        while let Some(order_id) = queue.recv().await {
            if let Err(e) = api.handle_expiry(&order_id).await {
                error!("🕰️ Error expiring order {order_id}: {e}");
            }
        }
        info!("🕰️ Expiry worker stopped");
    })
}
