use actix_web::{http::StatusCode, web, web::ServiceConfig};
use bundl_engine::{
    db_types::User,
    events::EventProducers,
    live::MemoryOrderCache,
    traits::UserDirectory,
    EngineSettings, OrderFlowApi, SqliteDatabase,
};
use serde_json::{json, Value};

use super::helpers::{get_request, issue_token, post_request};
use crate::routes::configure_orders;

async fn test_backend() -> (SqliteDatabase, MemoryOrderCache) {
    let _ = env_logger::try_init().ok();
    let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("in-memory database");
    (db, MemoryOrderCache::new())
}

fn configure_with(db: SqliteDatabase, cache: MemoryOrderCache) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = OrderFlowApi::new(db, cache, EngineSettings::default(), EventProducers::default());
        cfg.app_data(web::Data::new(api));
        configure_orders::<SqliteDatabase, MemoryOrderCache>(cfg);
    }
}

async fn register(db: &SqliteDatabase, phone: &str, credits: i64) -> (User, String) {
    let user = db.create_or_fetch_user(phone, credits).await.expect("user provisioning");
    let token = issue_token(&user.user_id, &user.phone_number);
    (user, token)
}

fn create_order_body(amount_needed: i64, initial_pledge: i64) -> Value {
    json!({
        "amountNeeded": amount_needed,
        "platform": "zomato",
        "latitude": 12.9716,
        "longitude": 77.5946,
        "initialPledge": initial_pledge,
    })
}

#[actix_web::test]
async fn create_order_without_token_is_unauthorized() {
    let (db, cache) = test_backend().await;
    let (status, _body) =
        post_request("", "/orders/createOrder", create_order_body(100, 40), configure_with(db, cache)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn create_order_returns_the_snapshot() {
    let (db, cache) = test_backend().await;
    let (user, token) = register(&db, "+919876543212", 5).await;

    let (status, body) = post_request(
        &token,
        "/orders/createOrder",
        create_order_body(100, 40),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    let order: Value = serde_json::from_str(&body).expect("JSON body");
    assert_eq!(order["status"], "ACTIVE");
    assert_eq!(order["amountNeeded"], 100);
    assert_eq!(order["totalPledge"], 40);
    assert_eq!(order["totalUsers"], 1);
    assert_eq!(order["pledgeMap"][user.user_id.as_str()], 40);
    assert!(order["id"].is_string());
}

#[actix_web::test]
async fn create_order_with_no_credits_is_bad_request() {
    let (db, cache) = test_backend().await;
    let (_user, token) = register(&db, "+919876543213", 0).await;

    let (status, body) =
        post_request(&token, "/orders/createOrder", create_order_body(100, 0), configure_with(db, cache)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Insufficient credits"), "body: {body}");
}

#[actix_web::test]
async fn fractional_amounts_are_bad_requests() {
    let (db, cache) = test_backend().await;
    let (_user, token) = register(&db, "+919876543214", 5).await;

    let body = json!({
        "amountNeeded": 99.5,
        "platform": "zomato",
        "latitude": 12.9716,
        "longitude": 77.5946,
    });
    let (status, _body) = post_request(&token, "/orders/createOrder", body, configure_with(db, cache)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn completing_pledge_reveals_phone_numbers() {
    let (db, cache) = test_backend().await;
    let (creator, creator_token) = register(&db, "+919876543215", 5).await;
    let (pledger, pledger_token) = register(&db, "+919876543216", 5).await;

    let (status, body) = post_request(
        &creator_token,
        "/orders/createOrder",
        create_order_body(100, 40),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order: Value = serde_json::from_str(&body).unwrap();
    let order_id = order["id"].as_str().unwrap();

    let (status, body) = post_request(
        &pledger_token,
        "/orders/pledgeToOrder",
        json!({ "orderId": order_id, "pledgeAmount": 70 }),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let receipt: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(receipt["status"], "COMPLETED");
    assert_eq!(receipt["completed"], true);
    assert_eq!(receipt["totalPledge"], 110);
    assert_eq!(receipt["phoneNumbers"][creator.user_id.as_str()], "+919876543215");
    assert_eq!(receipt["phoneNumbers"][pledger.user_id.as_str()], "+919876543216");
}

#[actix_web::test]
async fn active_order_status_shows_only_the_callers_pledge() {
    let (db, cache) = test_backend().await;
    let (creator, creator_token) = register(&db, "+919876543217", 5).await;
    let (pledger, pledger_token) = register(&db, "+919876543218", 5).await;

    let (_status, body) = post_request(
        &creator_token,
        "/orders/createOrder",
        create_order_body(500, 40),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    let order: Value = serde_json::from_str(&body).unwrap();
    let order_id = order["id"].as_str().unwrap().to_string();

    post_request(
        &pledger_token,
        "/orders/pledgeToOrder",
        json!({ "orderId": order_id, "pledgeAmount": 30 }),
        configure_with(db.clone(), cache.clone()),
    )
    .await;

    let (status, body) = get_request(
        &pledger_token,
        &format!("/orders/orderStatus/{order_id}"),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let view: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(view["status"], "ACTIVE");
    let pledge_map = view["pledgeMap"].as_object().unwrap();
    assert_eq!(pledge_map.len(), 1, "only the caller's entry may be visible");
    assert_eq!(pledge_map[pledger.user_id.as_str()], 30);
    assert!(pledge_map.get(creator.user_id.as_str()).is_none());
    // Aggregates remain visible.
    assert_eq!(view["totalPledge"], 70);
    assert_eq!(view["totalUsers"], 2);
}

#[actix_web::test]
async fn non_participant_order_status_is_not_found() {
    let (db, cache) = test_backend().await;
    let (_creator, creator_token) = register(&db, "+919876543219", 5).await;
    let (_outsider, outsider_token) = register(&db, "+919876543220", 5).await;

    let (_status, body) = post_request(
        &creator_token,
        "/orders/createOrder",
        create_order_body(500, 40),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    let order: Value = serde_json::from_str(&body).unwrap();
    let order_id = order["id"].as_str().unwrap();

    let (status, _body) = get_request(
        &outsider_token,
        &format!("/orders/orderStatus/{order_id}"),
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn active_orders_returns_nearby_snapshots() {
    let (db, cache) = test_backend().await;
    let (_creator, token) = register(&db, "+919876543221", 5).await;

    post_request(
        &token,
        "/orders/createOrder",
        create_order_body(200, 10),
        configure_with(db.clone(), cache.clone()),
    )
    .await;

    let (status, body) = get_request(
        &token,
        "/orders/activeOrders?latitude=12.9716&longitude=77.5946&radiusKm=10",
        configure_with(db.clone(), cache.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let orders: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(orders.as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["status"], "ACTIVE");
}
