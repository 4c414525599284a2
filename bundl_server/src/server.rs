use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use bundl_engine::{
    events::{EventHandlers, EventProducers},
    live::{ExpiryWatcher, KeyFamily, RedisOrderCache},
    LedgerApi, OrderFlowApi, SqliteDatabase,
};
use tokio::sync::mpsc;

use crate::{
    auth::{TokenIssuer, TokenVerifier},
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    notifier::{notification_hooks, DebugOtpProvider, LogPushSender},
    routes::{configure_auth, configure_credits, configure_orders, health},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let keys = KeyFamily::new(config.cache_namespace.clone());
    let cache = RedisOrderCache::new(&config.redis_url, keys.clone())
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let hooks = notification_hooks(db.clone(), LogPushSender);
    let handlers = EventHandlers::new(32, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    // Close the crash window between a TTL firing and its refund fan-out before accepting any traffic.
    let engine = OrderFlowApi::new(db.clone(), cache.clone(), config.engine.clone(), producers.clone());
    engine.reconcile_on_startup().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let (expiry_tx, expiry_rx) = mpsc::channel(256);
    ExpiryWatcher::new(&config.redis_url, keys, config.expiry_channel.clone(), expiry_tx).start();
    start_expiry_worker(engine, expiry_rx);

    let srv = create_server_instance(config, db, cache, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    cache: RedisOrderCache,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let otp = DebugOtpProvider::new();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), cache.clone(), config.engine.clone(), producers.clone());
        let ledger_api = LedgerApi::new(db.clone());
        let issuer = TokenIssuer::new(&config.auth);
        let verifier = TokenVerifier::new(&config.auth);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bundl_server"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(issuer))
            .app_data(web::Data::new(verifier))
            .app_data(web::Data::new(otp.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(health)
            .configure(configure_auth::<SqliteDatabase, DebugOtpProvider>)
            .configure(configure_orders::<SqliteDatabase, RedisOrderCache>)
            .configure(configure_credits::<SqliteDatabase>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
