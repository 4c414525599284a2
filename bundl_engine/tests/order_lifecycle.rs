//! End-to-end lifecycle tests for the order engine, run against an in-memory SQLite database and the in-process
//! live cache.
use bundl_common::Money;
use bundl_engine::{
    db_types::{NewOrder, Order, OrderStatus, User},
    events::EventProducers,
    live::MemoryOrderCache,
    traits::{CreditLedger, LiveOrderCache, OrderArchive, UserDirectory},
    EngineSettings, OrderFlowApi, OrderFlowError, SqliteDatabase,
};
use chrono::{Duration, Utc};

type TestApi = OrderFlowApi<SqliteDatabase, MemoryOrderCache>;

async fn test_api() -> (TestApi, SqliteDatabase, MemoryOrderCache) {
    let _ = env_logger::try_init();
    let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("in-memory database");
    let cache = MemoryOrderCache::new();
    let api = OrderFlowApi::new(db.clone(), cache.clone(), EngineSettings::default(), EventProducers::default());
    (api, db, cache)
}

async fn user_with_credits(db: &SqliteDatabase, phone: &str, credits: i64) -> User {
    db.create_or_fetch_user(phone, credits).await.expect("user creation")
}

fn order_request(amount_needed: i64) -> NewOrder {
    NewOrder::new(Money::from(amount_needed), "zomato", 12.9716, 77.5946)
}

#[tokio::test]
async fn s1_simple_completion_reveals_phone_numbers() {
    let (api, db, cache) = test_api().await;
    let alice = user_with_credits(&db, "+919876543212", 5).await;
    let bob = user_with_credits(&db, "+919876543213", 5).await;

    let order = api
        .create_order(&alice.user_id, order_request(100).with_initial_pledge(Money::from(40)))
        .await
        .expect("createOrder");
    assert_eq!(db.balance(&alice.user_id).await.unwrap(), 4);
    assert_eq!(order.total_pledge, Money::from(40));
    assert_eq!(order.status, OrderStatus::Active);

    let receipt = api.pledge_to_order(&bob.user_id, &order.order_id, Money::from(70)).await.expect("pledge");
    assert_eq!(db.balance(&bob.user_id).await.unwrap(), 4);
    assert!(receipt.completed);
    assert_eq!(receipt.order.status, OrderStatus::Completed);
    assert_eq!(receipt.order.total_pledge, Money::from(110));
    assert_eq!(receipt.order.pledge_map[&alice.user_id], Money::from(40));
    assert_eq!(receipt.order.pledge_map[&bob.user_id], Money::from(70));
    assert!(receipt.order.totals_consistent());

    let phones = receipt.phone_numbers.expect("phone map on completion");
    assert_eq!(phones[&alice.user_id], "+919876543212");
    assert_eq!(phones[&bob.user_id], "+919876543213");

    // Threshold safety: a completed order is gone from the live cache and terminal in the store.
    assert!(cache.fetch_order(&order.order_id).await.unwrap().is_none());
    let row = db.fetch_order(&order.order_id).await.unwrap().expect("order row");
    assert_eq!(row.status, OrderStatus::Completed);
}

#[tokio::test]
async fn s2_overshoot_race_completes_exactly_once() {
    let (api, db, _cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000001", 5).await;
    let carol = user_with_credits(&db, "+911000000002", 5).await;
    let dave = user_with_credits(&db, "+911000000003", 5).await;

    let order = api
        .create_order(&creator.user_id, order_request(100).with_initial_pledge(Money::from(90)))
        .await
        .expect("createOrder");

    let (first, second) = tokio::join!(
        api.pledge_to_order(&carol.user_id, &order.order_id, Money::from(60)),
        api.pledge_to_order(&dave.user_id, &order.order_id, Money::from(60)),
    );
    let outcomes = [first, second];
    let completions = outcomes
        .iter()
        .filter(|r| matches!(r, Ok(receipt) if receipt.completed))
        .count();
    assert_eq!(completions, 1, "exactly one pledge may win the completion race");
    let failures = outcomes.iter().filter_map(|r| r.as_ref().err()).collect::<Vec<_>>();
    assert_eq!(failures.len(), 1);
    assert!(
        matches!(failures[0], OrderFlowError::OrderFullyPledged),
        "the loser must hear ORDER_FULLY_PLEDGED, got {:?}",
        failures[0]
    );

    // The winning total is 90 + 60; the losing pledge never lands, so 210 is unrepresentable.
    let row = db.fetch_order(&order.order_id).await.unwrap().expect("order row");
    assert_eq!(row.status, OrderStatus::Completed);
    assert_eq!(row.total_pledge, Money::from(150));

    // The loser was refunded: 5 - 1 + 1 for one of the two, 5 - 1 for the other.
    let balances =
        (db.balance(&carol.user_id).await.unwrap(), db.balance(&dave.user_id).await.unwrap());
    assert!(balances == (4, 5) || balances == (5, 4), "unexpected balances {balances:?}");
}

#[tokio::test]
async fn s2_late_pledge_after_completion_reports_fully_pledged() {
    let (api, db, _cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000011", 5).await;
    let carol = user_with_credits(&db, "+911000000012", 5).await;
    let dave = user_with_credits(&db, "+911000000013", 5).await;

    let order = api
        .create_order(&creator.user_id, order_request(100).with_initial_pledge(Money::from(90)))
        .await
        .expect("createOrder");
    api.pledge_to_order(&carol.user_id, &order.order_id, Money::from(60)).await.expect("winning pledge");

    let err = api.pledge_to_order(&dave.user_id, &order.order_id, Money::from(60)).await.expect_err("late pledge");
    assert!(matches!(err, OrderFlowError::OrderFullyPledged), "got {err:?}");
    assert_eq!(db.balance(&dave.user_id).await.unwrap(), 5, "losing pledge must be refunded");
}

#[tokio::test]
async fn s3_expiry_refunds_each_participant_exactly_once() {
    let (api, db, cache) = test_api().await;
    let erin = user_with_credits(&db, "+911000000021", 5).await;
    let frank = user_with_credits(&db, "+911000000022", 5).await;

    let order = api
        .create_order(
            &erin.user_id,
            order_request(200).with_initial_pledge(Money::from(50)).with_ttl_seconds(60),
        )
        .await
        .expect("createOrder");
    api.pledge_to_order(&frank.user_id, &order.order_id, Money::from(30)).await.expect("pledge");
    assert_eq!(db.balance(&erin.user_id).await.unwrap(), 4);
    assert_eq!(db.balance(&frank.user_id).await.unwrap(), 4);

    api.handle_expiry(&order.order_id).await.expect("expiry");
    assert_eq!(db.balance(&erin.user_id).await.unwrap(), 5);
    assert_eq!(db.balance(&frank.user_id).await.unwrap(), 5);
    let row = db.fetch_order(&order.order_id).await.unwrap().expect("order row");
    assert_eq!(row.status, OrderStatus::Expired);
    assert!(cache.fetch_order(&order.order_id).await.unwrap().is_none());

    // A second expiry event is a no-op: no double refunds.
    api.handle_expiry(&order.order_id).await.expect("second expiry");
    assert_eq!(db.balance(&erin.user_id).await.unwrap(), 5);
    assert_eq!(db.balance(&frank.user_id).await.unwrap(), 5);
}

#[tokio::test]
async fn s4_insufficient_credits_leaves_no_trace() {
    let (api, db, _cache) = test_api().await;
    let broke = user_with_credits(&db, "+911000000031", 0).await;

    let err = api.create_order(&broke.user_id, order_request(100)).await.expect_err("createOrder must fail");
    assert!(matches!(err, OrderFlowError::InsufficientCredits), "got {err:?}");
    assert_eq!(db.balance(&broke.user_id).await.unwrap(), 0);
    assert!(db.fetch_active_orders().await.unwrap().is_empty(), "no order row may exist");
}

#[tokio::test]
async fn s5_non_participant_lookup_is_not_found() {
    let (api, db, _cache) = test_api().await;
    let harry = user_with_credits(&db, "+911000000041", 5).await;
    let iris = user_with_credits(&db, "+911000000042", 5).await;
    let jane = user_with_credits(&db, "+911000000043", 5).await;

    let order = api
        .create_order(&harry.user_id, order_request(500).with_initial_pledge(Money::from(20)))
        .await
        .expect("createOrder");
    api.pledge_to_order(&iris.user_id, &order.order_id, Money::from(30)).await.expect("pledge");

    let err = api.order_status(&jane.user_id, &order.order_id).await.expect_err("non-participant lookup");
    assert!(matches!(err, OrderFlowError::OrderNotFound), "got {err:?}");
}

#[tokio::test]
async fn s6_additive_pledges_accumulate_under_one_key() {
    let (api, db, _cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000051", 5).await;
    let kim = user_with_credits(&db, "+911000000052", 5).await;

    let order = api.create_order(&creator.user_id, order_request(100)).await.expect("createOrder");
    api.pledge_to_order(&kim.user_id, &order.order_id, Money::from(10)).await.expect("first pledge");
    let receipt = api.pledge_to_order(&kim.user_id, &order.order_id, Money::from(15)).await.expect("second pledge");

    assert_eq!(receipt.order.pledge_map[&kim.user_id], Money::from(25));
    assert_eq!(receipt.order.total_users, 1);
    assert_eq!(receipt.order.total_pledge, Money::from(25));
    // Two actions, two credits.
    assert_eq!(db.balance(&kim.user_id).await.unwrap(), 3);
}

#[tokio::test]
async fn active_order_status_redacts_other_pledgers() {
    let (api, db, _cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000061", 5).await;
    let lena = user_with_credits(&db, "+911000000062", 5).await;

    let order = api
        .create_order(&creator.user_id, order_request(500).with_initial_pledge(Money::from(40)))
        .await
        .expect("createOrder");
    api.pledge_to_order(&lena.user_id, &order.order_id, Money::from(25)).await.expect("pledge");

    let view = api.order_status(&lena.user_id, &order.order_id).await.expect("status");
    assert_eq!(view.order.status, OrderStatus::Active);
    assert_eq!(view.order.pledge_map.len(), 1, "ACTIVE status must only show the caller's own pledge");
    assert_eq!(view.order.pledge_map[&lena.user_id], Money::from(25));
    assert!(view.phone_numbers.is_none());
    assert!(!view.credit_refunded);
    // Aggregates stay visible even though the map is redacted.
    assert_eq!(view.order.total_pledge, Money::from(65));
    assert_eq!(view.order.total_users, 2);
}

#[tokio::test]
async fn expired_order_status_notes_the_refund() {
    let (api, db, _cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000071", 5).await;

    let order = api
        .create_order(&creator.user_id, order_request(300).with_initial_pledge(Money::from(10)))
        .await
        .expect("createOrder");
    api.handle_expiry(&order.order_id).await.expect("expiry");

    let view = api.order_status(&creator.user_id, &order.order_id).await.expect("status");
    assert_eq!(view.order.status, OrderStatus::Expired);
    assert!(view.credit_refunded);
    assert!(view.phone_numbers.is_none());
}

#[tokio::test]
async fn discovery_omits_completed_orders() {
    let (api, db, _cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000081", 5).await;
    let pledger = user_with_credits(&db, "+911000000082", 5).await;

    let open = api
        .create_order(&creator.user_id, order_request(500).with_initial_pledge(Money::from(10)))
        .await
        .expect("open order");
    let filled = api
        .create_order(&creator.user_id, order_request(100).with_initial_pledge(Money::from(90)))
        .await
        .expect("nearly-full order");
    api.pledge_to_order(&pledger.user_id, &filled.order_id, Money::from(10)).await.expect("completing pledge");

    let nearby = api.active_orders_near(12.9716, 77.5946, Some(10.0)).await.expect("discovery");
    let ids = nearby.iter().map(|o| o.order_id.clone()).collect::<Vec<_>>();
    assert!(ids.contains(&open.order_id));
    assert!(!ids.contains(&filled.order_id), "completed orders must never be discoverable");
}

#[tokio::test]
async fn reconciliation_expires_overdue_rows_and_rehydrates_the_rest() {
    let (api, db, cache) = test_api().await;
    let creator = user_with_credits(&db, "+911000000091", 5).await;

    // A live order that somehow fell out of the cache (e.g. the process died after the durable insert).
    let fresh = order_request(400)
        .with_initial_pledge(Money::from(10))
        .into_order(creator.user_id.clone(), Duration::seconds(600), Utc::now());
    db.insert_order(&fresh).await.expect("insert fresh row");

    // An order whose deadline passed while nobody was watching.
    let overdue: Order = {
        let mut order = order_request(400)
            .with_initial_pledge(Money::from(10))
            .into_order(creator.user_id.clone(), Duration::seconds(600), Utc::now() - Duration::seconds(700));
        order.expires_at = Utc::now() - Duration::seconds(100);
        order
    };
    db.insert_order(&overdue).await.expect("insert overdue row");
    let balance_before = db.balance(&creator.user_id).await.unwrap();

    let summary = api.reconcile_on_startup().await.expect("reconcile");
    assert_eq!(summary.rehydrated, 1);
    assert_eq!(summary.expired, 1);

    assert!(cache.fetch_order(&fresh.order_id).await.unwrap().is_some(), "fresh order back in the cache");
    let row = db.fetch_order(&overdue.order_id).await.unwrap().expect("overdue row");
    assert_eq!(row.status, OrderStatus::Expired);
    assert_eq!(db.balance(&creator.user_id).await.unwrap(), balance_before + 1, "overdue participant refunded");
}

#[tokio::test]
async fn pledge_on_unknown_order_is_refunded() {
    let (api, db, _cache) = test_api().await;
    let user = user_with_credits(&db, "+911000000101", 5).await;

    let missing = bundl_engine::db_types::OrderId("no-such-order".to_string());
    let err = api
        .pledge_to_order(&user.user_id, &missing, Money::from(10))
        .await
        .expect_err("pledge on unknown order");
    assert!(matches!(err, OrderFlowError::OrderNotFound), "got {err:?}");
    assert_eq!(db.balance(&user.user_id).await.unwrap(), 5, "debit must be returned");
}

#[tokio::test]
async fn validation_rejects_bad_requests_without_charging() {
    let (api, db, _cache) = test_api().await;
    let user = user_with_credits(&db, "+911000000111", 5).await;

    let bad_amount = NewOrder::new(Money::from(0), "zomato", 12.9716, 77.5946);
    assert!(matches!(
        api.create_order(&user.user_id, bad_amount).await,
        Err(OrderFlowError::Validation(_))
    ));
    let bad_lat = NewOrder::new(Money::from(100), "zomato", 95.0, 77.5946);
    assert!(matches!(api.create_order(&user.user_id, bad_lat).await, Err(OrderFlowError::Validation(_))));
    let blank_platform = NewOrder::new(Money::from(100), "  ", 12.9716, 77.5946);
    assert!(matches!(
        api.create_order(&user.user_id, blank_platform).await,
        Err(OrderFlowError::Validation(_))
    ));
    assert_eq!(db.balance(&user.user_id).await.unwrap(), 5, "validation failures must be free");
}
