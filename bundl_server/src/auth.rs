//! Bearer-token authentication for the HTTP surface.
//!
//! Access tokens are HS256 JWTs carrying the user's id and verified phone number. Handlers receive the claims as an
//! extractor; a missing or invalid `Authorization: Bearer` header turns into a 401 before any handler code runs.
//! Token minting happens only at the end of a successful phone verification.
use std::{
    fmt,
    fmt::{Debug, Display},
    future::{ready, Ready},
};

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use bundl_engine::db_types::UserId;
use chrono::Duration;
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    AlgorithmExt, Claims, Header, TimeOptions, Token, UntrustedToken,
};
use serde::{Deserialize, Serialize};

use crate::{config::AuthConfig, errors::{AuthError, ServerError}};

/// The HS256 signing secret for access tokens.
///
/// Every token this server mints or accepts derives its key from here, so the raw value must never end up in a log
/// line; Debug and Display both redact it. An unset secret is detected by the preflight check before the server
/// starts issuing worthless tokens.
#[derive(Clone, Default)]
pub struct JwtSecret(String);

impl JwtSecret {
    pub fn hs256_key(&self) -> Hs256Key {
        Hs256Key::new(self.0.as_bytes())
    }

    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }
}

impl From<String> for JwtSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl Display for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub user_id: UserId,
    pub phone_number: String,
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_claims(req))
    }
}

fn extract_claims(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let verifier = req
        .app_data::<web::Data<TokenVerifier>>()
        .ok_or_else(|| ServerError::ConfigurationError("TokenVerifier is not registered".to_string()))?;
    let value = req.headers().get(header::AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let value = value.to_str().map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthError::MissingToken)?;
    Ok(verifier.validate_bearer_token(token)?)
}

/// Validates access tokens. Registered as app data so the [`JwtClaims`] extractor can reach it.
pub struct TokenVerifier {
    secret: JwtSecret,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self { secret: config.jwt_secret.clone() }
    }

    pub fn validate_bearer_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let key = self.secret.hs256_key();
        let untrusted =
            UntrustedToken::new(token).map_err(|e| AuthError::PoorlyFormattedToken(format!("{e}")))?;
        let token: Token<JwtClaims> =
            Hs256.validator(&key).validate(&untrusted).map_err(|e| AuthError::ValidationError(e.to_string()))?;
        token.claims().validate_expiration(&TimeOptions::default()).map_err(|_| AuthError::ExpiredToken)?;
        Ok(token.claims().custom.clone())
    }
}

/// Issues access tokens after successful phone verification.
pub struct TokenIssuer {
    secret: JwtSecret,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { secret: config.jwt_secret.clone(), lifetime: Duration::hours(config.token_lifetime_hours) }
    }

    /// Issue a new access token for the given claims. The claims MUST come from a completed verification; this
    /// method does not check anything.
    pub fn issue_token(&self, claims: JwtClaims) -> Result<String, AuthError> {
        let header = Header::empty().with_token_type("JWT");
        let claims = Claims::new(claims).set_duration_and_issuance(&TimeOptions::default(), self.lifetime);
        Hs256
            .token(&header, &claims, &self.secret.hs256_key())
            .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_config() -> AuthConfig {
        // DO NOT re-use this secret anywhere.
        AuthConfig { jwt_secret: JwtSecret::from("unit-test-secret-0123456789".to_string()), token_lifetime_hours: 1 }
    }

    fn claims() -> JwtClaims {
        JwtClaims { user_id: UserId("user-1".to_string()), phone_number: "+919876543212".to_string() }
    }

    #[test]
    fn issued_tokens_validate() {
        let config = test_config();
        let token = TokenIssuer::new(&config).issue_token(claims()).unwrap();
        let validated = TokenVerifier::new(&config).validate_bearer_token(&token).unwrap();
        assert_eq!(validated, claims());
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let config = test_config();
        let mut token = TokenIssuer::new(&config).issue_token(claims()).unwrap();
        token.replace_range(token.len() - 6.., "aaaaaa");
        let err = TokenVerifier::new(&config).validate_bearer_token(&token).unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)), "got {err:?}");
    }

    #[test]
    fn tokens_from_another_key_are_rejected() {
        let token = TokenIssuer::new(&test_config()).issue_token(claims()).unwrap();
        let other = AuthConfig {
            jwt_secret: JwtSecret::from("a-completely-different-secret".to_string()),
            token_lifetime_hours: 1,
        };
        assert!(TokenVerifier::new(&other).validate_bearer_token(&token).is_err());
    }

    #[test]
    fn secret_never_prints_its_value() {
        let secret = JwtSecret::from("super-sensitive".to_string());
        assert_eq!(format!("{secret}"), "****");
        assert_eq!(format!("{secret:?}"), "****");
        assert!(secret.is_set());
        assert!(!JwtSecret::default().is_set());
    }

    #[test]
    fn garbage_is_poorly_formatted() {
        let err = TokenVerifier::new(&test_config()).validate_bearer_token("not-a-jwt").unwrap_err();
        assert!(matches!(err, AuthError::PoorlyFormattedToken(_)), "got {err:?}");
    }
}
