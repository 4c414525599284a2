use actix_web::{http::StatusCode, web, web::ServiceConfig};
use bundl_engine::{db_types::UserId, LedgerApi};

use super::{
    helpers::{get_request, issue_token},
    mocks::MockBackend,
};
use crate::routes::configure_credits;

fn caller() -> UserId {
    UserId("caller-1".to_string())
}

fn configure(cfg: &mut ServiceConfig) {
    let mut backend = MockBackend::new();
    backend.expect_balance().returning(|_| Ok(3));
    cfg.app_data(web::Data::new(LedgerApi::new(backend)));
    configure_credits::<MockBackend>(cfg);
}

#[actix_web::test]
async fn balance_without_token_is_unauthorized() {
    let _ = env_logger::try_init().ok();
    let (status, _body) = get_request("", "/credits/balance", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn balance_with_garbage_token_is_unauthorized() {
    let _ = env_logger::try_init().ok();
    let (status, _body) = get_request("not-a-jwt", "/credits/balance", configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn balance_returns_the_callers_credits() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(&caller(), "+919876543212");
    let (status, body) = get_request(&token, "/credits/balance", configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"credits":3}"#);
}
