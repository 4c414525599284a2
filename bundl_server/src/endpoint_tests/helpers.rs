use actix_web::{
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use bundl_engine::db_types::UserId;

use crate::{
    auth::{JwtClaims, JwtSecret, TokenIssuer, TokenVerifier},
    config::AuthConfig,
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: JwtSecret::from("endpoint-test-secret-6b2d4f8a91c35e07".to_string()),
        token_lifetime_hours: 24,
    }
}

pub fn issue_token(user_id: &UserId, phone_number: &str) -> String {
    let claims = JwtClaims { user_id: user_id.clone(), phone_number: phone_number.to_string() };
    TokenIssuer::new(&get_auth_config()).issue_token(claims).expect("Failed to sign token")
}

pub async fn get_request(
    token: &str,
    path: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = TestRequest::get().uri(path);
    send_request(req, token, configure).await
}

pub async fn post_request(
    token: &str,
    path: &str,
    body: serde_json::Value,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let req = TestRequest::post().uri(path).set_json(body);
    send_request(req, token, configure).await
}

async fn send_request(
    mut req: TestRequest,
    token: &str,
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    if !token.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {token}")));
    }
    let app = App::new()
        .app_data(web::Data::new(TokenVerifier::new(&get_auth_config())))
        .configure(configure);
    let service = test::init_service(app).await;
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    (status, body)
}
