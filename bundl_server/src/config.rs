use std::{env, str::FromStr};

use bundl_common::Money;
use bundl_engine::{live::DEFAULT_EXPIRY_CHANNEL, EngineSettings};
use log::*;

use crate::auth::JwtSecret;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3002;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/bundl.db";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CACHE_NAMESPACE: &str = "bundl:";
const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;
const DEFAULT_USER_CREDITS: i64 = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    /// Namespace prefix for every live-cache key
    pub cache_namespace: String,
    /// Pub/sub pattern the expiry watcher subscribes to
    pub expiry_channel: String,
    /// Starting balance granted on first phone verification
    pub default_user_credits: i64,
    /// When set, the OTP flow accepts any code. Never enable in production.
    pub debug_otp: bool,
    pub auth: AuthConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,
    pub token_lifetime_hours: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            expiry_channel: DEFAULT_EXPIRY_CHANNEL.to_string(),
            default_user_credits: DEFAULT_USER_CREDITS,
            debug_otp: false,
            auth: AuthConfig { jwt_secret: JwtSecret::default(), token_lifetime_hours: DEFAULT_TOKEN_LIFETIME_HOURS },
            engine: EngineSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = ServerConfig::default();
        let engine_defaults = EngineSettings::default();
        let engine = EngineSettings {
            credit_cost_per_action: env_or("BUNDL_CREDIT_COST_PER_ACTION", engine_defaults.credit_cost_per_action),
            default_order_expiry_seconds: env_or(
                "BUNDL_DEFAULT_ORDER_EXPIRY_SECONDS",
                engine_defaults.default_order_expiry_seconds,
            ),
            default_search_radius_km: env_or("BUNDL_DEFAULT_SEARCH_RADIUS_KM", engine_defaults.default_search_radius_km),
            order_min_amount: Money::from(env_or("BUNDL_ORDER_MIN_AMOUNT", engine_defaults.order_min_amount.value())),
            pledge_min_amount: Money::from(env_or(
                "BUNDL_PLEDGE_MIN_AMOUNT",
                engine_defaults.pledge_min_amount.value(),
            )),
        };
        Self {
            host: env::var("BUNDL_HOST").ok().unwrap_or(defaults.host),
            port: env_or("BUNDL_PORT", defaults.port),
            database_url: env::var("BUNDL_DATABASE_URL").ok().unwrap_or(defaults.database_url),
            redis_url: env::var("BUNDL_REDIS_URL").ok().unwrap_or(defaults.redis_url),
            cache_namespace: env::var("BUNDL_CACHE_NAMESPACE").ok().unwrap_or(defaults.cache_namespace),
            expiry_channel: env::var("BUNDL_EXPIRY_CHANNEL").ok().unwrap_or(defaults.expiry_channel),
            default_user_credits: env_or("BUNDL_DEFAULT_USER_CREDITS", defaults.default_user_credits),
            debug_otp: env_flag("BUNDL_DEBUG_OTP", false),
            auth: AuthConfig::from_env_or_default(),
            engine,
        }
    }
}

impl AuthConfig {
    pub fn from_env_or_default() -> Self {
        let jwt_secret = env::var("BUNDL_JWT_SECRET").ok().unwrap_or_else(|| {
            error!("BUNDL_JWT_SECRET is not set. Tokens signed with an empty key are worthless; set it before going live.");
            String::default()
        });
        Self {
            jwt_secret: JwtSecret::from(jwt_secret),
            token_lifetime_hours: env_or("BUNDL_TOKEN_LIFETIME_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.jwt_secret.is_set()
    }
}

fn env_or<T>(var: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
    <T as FromStr>::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("{s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn env_flag(var: &str, default: bool) -> bool {
    let Some(value) = env::var(var).ok() else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            error!("{other} is not a valid value for {var}. Using the default, {default}, instead.");
            default
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3002);
        assert_eq!(config.cache_namespace, "bundl:");
        assert_eq!(config.default_user_credits, 5);
        assert_eq!(config.engine.credit_cost_per_action, 1);
        assert_eq!(config.engine.default_order_expiry_seconds, 600);
        assert!(!config.debug_otp);
    }
}
