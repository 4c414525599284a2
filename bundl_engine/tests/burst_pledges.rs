//! Concurrency burst tests: many pledgers hammering the same order must never break the credit-conservation or
//! threshold invariants.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use bundl_common::Money;
use bundl_engine::{
    db_types::{NewOrder, OrderStatus, UserId},
    events::EventProducers,
    live::MemoryOrderCache,
    traits::{CreditLedger, OrderArchive, UserDirectory},
    EngineSettings, OrderFlowApi, OrderFlowError, SqliteDatabase,
};
use futures_util::future::join_all;
use log::*;
use tokio::runtime::Builder;

const NUM_THREADS: usize = 4;
const NUM_PLEDGERS: usize = 25;
const PLEDGES_PER_USER: usize = 3;

#[test]
fn burst_pledges_conserve_credits() {
    let _ = env_logger::try_init();
    info!("🚀️ Starting pledge injection test");
    let sys = Builder::new_multi_thread().worker_threads(NUM_THREADS).enable_time().build().unwrap();

    sys.block_on(async move {
        let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("Error creating database");
        let cache = MemoryOrderCache::new();
        let api =
            OrderFlowApi::new(db.clone(), cache.clone(), EngineSettings::default(), EventProducers::default());

        let creator = db.create_or_fetch_user("+911111111111", 5).await.unwrap();
        // Threshold far out of reach, so every pledge lands and none completes.
        let order = api
            .create_order(&creator.user_id, NewOrder::new(Money::from(1_000_000), "zomato", 12.9716, 77.5946))
            .await
            .expect("createOrder");

        let mut pledgers: Vec<UserId> = Vec::with_capacity(NUM_PLEDGERS);
        for i in 0..NUM_PLEDGERS {
            let user = db.create_or_fetch_user(&format!("+9120000000{i:02}"), 5).await.unwrap();
            pledgers.push(user.user_id);
        }

        info!("🚀️ Injecting {} pledges", NUM_PLEDGERS * PLEDGES_PER_USER);
        let mut tasks = Vec::with_capacity(NUM_PLEDGERS);
        for user_id in pledgers.clone() {
            let db2 = db.clone();
            let cache2 = cache.clone();
            let order_id = order.order_id.clone();
            tasks.push(tokio::spawn(async move {
                let api =
                    OrderFlowApi::new(db2, cache2, EngineSettings::default(), EventProducers::default());
                for _ in 0..PLEDGES_PER_USER {
                    api.pledge_to_order(&user_id, &order_id, Money::from(10)).await.expect("pledge");
                }
            }));
        }
        let results = join_all(tasks).await;
        assert!(results.iter().all(|r| r.is_ok()), "Not all tasks completed happily");

        // Every accepted pledge costs exactly one credit, and repeated pledges never inflate the user count.
        for user_id in &pledgers {
            assert_eq!(db.balance(user_id).await.unwrap(), 5 - PLEDGES_PER_USER as i64);
        }
        let row = db.fetch_order(&order.order_id).await.unwrap().expect("order row");
        assert_eq!(row.status, OrderStatus::Active);
        assert_eq!(row.total_users, NUM_PLEDGERS as i64);
        assert_eq!(row.total_pledge, Money::from((NUM_PLEDGERS * PLEDGES_PER_USER * 10) as i64));
        for user_id in &pledgers {
            assert_eq!(row.pledge_map[user_id], Money::from((PLEDGES_PER_USER * 10) as i64));
        }
    });
    info!("🚀️ test complete");
}

#[test]
fn burst_completion_fires_exactly_once() {
    let _ = env_logger::try_init();
    let sys = Builder::new_multi_thread().worker_threads(NUM_THREADS).enable_time().build().unwrap();

    sys.block_on(async move {
        let db = SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("Error creating database");
        let cache = MemoryOrderCache::new();
        let api =
            OrderFlowApi::new(db.clone(), cache.clone(), EngineSettings::default(), EventProducers::default());

        let creator = db.create_or_fetch_user("+913111111111", 5).await.unwrap();
        let order = api
            .create_order(&creator.user_id, NewOrder::new(Money::from(100), "swiggy", 12.9716, 77.5946))
            .await
            .expect("createOrder");

        let contenders = 20usize;
        let mut users: Vec<UserId> = Vec::with_capacity(contenders);
        for i in 0..contenders {
            let user = db.create_or_fetch_user(&format!("+9140000000{i:02}"), 5).await.unwrap();
            users.push(user.user_id);
        }

        let completions = Arc::new(AtomicU64::new(0));
        let accepted = Arc::new(AtomicU64::new(0));
        let mut tasks = Vec::with_capacity(contenders);
        for user_id in users.clone() {
            let db2 = db.clone();
            let cache2 = cache.clone();
            let order_id = order.order_id.clone();
            let completions = completions.clone();
            let accepted = accepted.clone();
            tasks.push(tokio::spawn(async move {
                let api =
                    OrderFlowApi::new(db2, cache2, EngineSettings::default(), EventProducers::default());
                match api.pledge_to_order(&user_id, &order_id, Money::from(60)).await {
                    Ok(receipt) => {
                        accepted.fetch_add(1, Ordering::SeqCst);
                        if receipt.completed {
                            completions.fetch_add(1, Ordering::SeqCst);
                        }
                    },
                    // Losing the completion race must always read as "fully pledged".
                    Err(OrderFlowError::OrderFullyPledged) => {},
                    Err(e) => panic!("Unexpected pledge error: {e}"),
                }
            }));
        }
        let results = join_all(tasks).await;
        assert!(results.iter().all(|r| r.is_ok()), "Not all tasks completed happily");

        // 100 needed, pledges of 60: the second accepted pledge tips the threshold and no further pledge lands.
        assert_eq!(completions.load(Ordering::SeqCst), 1, "completion must fire exactly once");
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        let row = db.fetch_order(&order.order_id).await.unwrap().expect("order row");
        assert_eq!(row.status, OrderStatus::Completed);
        assert_eq!(row.total_pledge, Money::from(120));

        // Losers were refunded in full; the two winners paid one credit each.
        let mut spent = 0;
        for user_id in &users {
            let balance = db.balance(user_id).await.unwrap();
            assert!(balance == 5 || balance == 4, "balance must be 4 or 5, got {balance}");
            if balance == 4 {
                spent += 1;
            }
        }
        assert_eq!(spent, 2, "exactly the accepted pledges may cost a credit");
    });
}
