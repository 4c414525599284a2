use actix_web::{http::StatusCode, web, web::ServiceConfig};
use bundl_engine::{LedgerApi, SqliteDatabase};
use serde_json::{json, Value};

use super::helpers::{get_auth_config, post_request};
use crate::{
    auth::{TokenIssuer, TokenVerifier},
    config::ServerConfig,
    notifier::DebugOtpProvider,
    routes::configure_auth,
};

async fn test_db() -> SqliteDatabase {
    let _ = env_logger::try_init().ok();
    SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("in-memory database")
}

fn configure_with(db: SqliteDatabase, otp: DebugOtpProvider) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let config = ServerConfig { auth: get_auth_config(), debug_otp: true, ..ServerConfig::default() };
        cfg.app_data(web::Data::new(LedgerApi::new(db)));
        cfg.app_data(web::Data::new(otp));
        cfg.app_data(web::Data::new(TokenIssuer::new(&get_auth_config())));
        cfg.app_data(web::Data::new(config));
        configure_auth::<SqliteDatabase, DebugOtpProvider>(cfg);
    }
}

#[actix_web::test]
async fn send_otp_rejects_malformed_phone_numbers() {
    let db = test_db().await;
    let otp = DebugOtpProvider::new();
    let (status, _body) = post_request(
        "",
        "/auth/sendOtp",
        json!({ "phoneNumber": "9876543212" }),
        configure_with(db, otp),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn verify_with_unknown_tid_is_unauthorized() {
    let db = test_db().await;
    let otp = DebugOtpProvider::new();
    let (status, _body) = post_request(
        "",
        "/auth/verifyOtp",
        json!({ "tid": "no-such-transaction", "otp": "000000" }),
        configure_with(db, otp),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn otp_round_trip_provisions_the_user_once() {
    let db = test_db().await;
    let otp = DebugOtpProvider::new();

    let (status, body) = post_request(
        "",
        "/auth/sendOtp",
        json!({ "phoneNumber": "+919876543212" }),
        configure_with(db.clone(), otp.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let tid = serde_json::from_str::<Value>(&body).unwrap()["tid"].as_str().unwrap().to_string();

    let (status, body) = post_request(
        "",
        "/auth/verifyOtp",
        json!({ "tid": tid, "otp": "000000", "fcmToken": "fcm-test-1" }),
        configure_with(db.clone(), otp.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["user"]["phoneNumber"], "+919876543212");
    assert_eq!(response["user"]["credits"], 5, "first verification grants the starting balance");
    assert_eq!(response["user"]["pushToken"], "fcm-test-1");
    let user_id = response["user"]["id"].as_str().unwrap().to_string();

    // The issued token is a valid bearer token for this user.
    let access_token = response["accessToken"].as_str().unwrap();
    let claims = TokenVerifier::new(&get_auth_config()).validate_bearer_token(access_token).unwrap();
    assert_eq!(claims.user_id.as_str(), user_id);

    // A second verification of the same phone resolves to the same user and does not re-grant credits.
    let (_status, body) = post_request(
        "",
        "/auth/sendOtp",
        json!({ "phoneNumber": "+919876543212" }),
        configure_with(db.clone(), otp.clone()),
    )
    .await;
    let tid = serde_json::from_str::<Value>(&body).unwrap()["tid"].as_str().unwrap().to_string();
    let (status, body) = post_request(
        "",
        "/auth/verifyOtp",
        json!({ "tid": tid, "otp": "123456" }),
        configure_with(db.clone(), otp.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let response: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(response["user"]["id"], user_id.as_str());
    assert_eq!(response["user"]["credits"], 5);
}
