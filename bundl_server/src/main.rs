use std::env;

use bundl_server::{config::ServerConfig, server::run_server};
use dotenvy::dotenv;
use log::{error, info};

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    if !preflight_check(&config) {
        eprintln!("🚀️ Preflight check failed. Exiting. Check the logs for details.");
        return;
    }

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    match run_server(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

fn preflight_check(config: &ServerConfig) -> bool {
    if env::var("BUNDL_SKIP_PREFLIGHT").ok() == Some("Yes".to_string()) {
        info!("🚦️ Skipping preflight checks. I hope you know what you're doing!");
        return true;
    }
    let mut result = true;
    info!("🚦️ Running preflight checks...");
    if !config.auth.is_usable() {
        error!("🚦️ Preflight check FAILED: BUNDL_JWT_SECRET must be set before issuing access tokens.");
        result = false;
    }
    if config.database_url.is_empty() {
        error!("🚦️ BUNDL_DATABASE_URL is not set. Please set it to the URL for the Bundl database.");
        result = false;
    }
    if config.redis_url.is_empty() {
        error!("🚦️ BUNDL_REDIS_URL is not set. The live order cache cannot run without it.");
        result = false;
    }
    if !config.debug_otp {
        error!(
            "🚦️ No OTP provider is configured. Wire your SMS provider into the OtpProvider seam, or set \
             BUNDL_DEBUG_OTP=true for development (any code verifies!)."
        );
        result = false;
    }
    if result {
        info!("🚦️ Preflight check PASSED.");
    } else {
        error!("🚦️ Preflight check FAILED: Please fix the issues above before starting the server.");
        info!(
            "🚦️ If you really know what you're doing and want to skip the preflight check, set \
             `BUNDL_SKIP_PREFLIGHT` to `Yes` in your environment variables"
        );
    }
    result
}
