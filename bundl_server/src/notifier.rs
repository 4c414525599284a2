//! Wiring between engine events and the outside world: push notifications and the debug OTP provider.
//!
//! Everything here is best effort. A failed push or a missing token changes nothing about order state, and no
//! error ever travels back into the engine.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bundl_engine::{
    events::EventHooks,
    traits::{OtpError, OtpProvider, PushSender, UserDirectory},
    SqliteDatabase,
};
use log::*;
use uuid::Uuid;

/// A push sender that only writes to the log. Stands in for the real delivery service in development and tests.
#[derive(Debug, Clone, Default)]
pub struct LogPushSender;

impl PushSender for LogPushSender {
    async fn send(&self, push_token: &str, title: &str, body: &str) {
        let preview = push_token.chars().take(12).collect::<String>();
        info!("📣️ push [{preview}...] {title}: {body}");
    }
}

/// The original backend's debug mode: any code verifies, and the "delivery" is a log line. Gated behind the
/// `BUNDL_DEBUG_OTP` flag; production deployments plug a real provider into the same trait.
#[derive(Clone, Default)]
pub struct DebugOtpProvider {
    pending: Arc<Mutex<HashMap<String, String>>>,
}

impl DebugOtpProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OtpProvider for DebugOtpProvider {
    async fn begin_verification(&self, phone_number: &str) -> Result<String, OtpError> {
        validate_phone_number(phone_number)?;
        let tid = Uuid::new_v4().to_string();
        self.pending
            .lock()
            .expect("otp mutex poisoned")
            .insert(tid.clone(), phone_number.to_string());
        info!("🔐️ [debug] OTP requested for {phone_number}; any code will verify");
        Ok(tid)
    }

    async fn complete_verification(&self, tid: &str, _code: &str) -> Result<String, OtpError> {
        let phone = self.pending.lock().expect("otp mutex poisoned").remove(tid);
        phone.ok_or(OtpError::UnknownTransaction)
    }
}

fn validate_phone_number(phone_number: &str) -> Result<(), OtpError> {
    let rest = phone_number
        .strip_prefix('+')
        .ok_or_else(|| OtpError::InvalidPhoneNumber(phone_number.to_string()))?;
    let digits = rest.chars().all(|c| c.is_ascii_digit());
    if !digits || !(8..=15).contains(&rest.len()) {
        return Err(OtpError::InvalidPhoneNumber(phone_number.to_string()));
    }
    Ok(())
}

/// Builds the event hooks that turn lifecycle events into pushes.
///
/// Token resolution goes through the user directory at dispatch time; users without a push token are silently
/// skipped.
pub fn notification_hooks<P>(db: SqliteDatabase, push: P) -> EventHooks
where P: PushSender + Clone + 'static {
    let mut hooks = EventHooks::default();
    {
        let db = db.clone();
        let push = push.clone();
        hooks.on_order_created(move |ev| {
            let db = db.clone();
            let push = push.clone();
            Box::pin(async move {
                let title = "Order created".to_string();
                let body = format!(
                    "Your {} order is live: {} of {} pledged",
                    ev.order.platform, ev.order.total_pledge, ev.order.amount_needed
                );
                push_to_users(&db, &push, &[ev.order.creator_id.clone()], &title, &body).await;
            })
        });
    }
    {
        let db = db.clone();
        let push = push.clone();
        hooks.on_pledge_success(move |ev| {
            let db = db.clone();
            let push = push.clone();
            Box::pin(async move {
                let title = "Pledge accepted".to_string();
                let body = if ev.order.total_pledge >= ev.order.amount_needed {
                    format!("Your pledge filled the {} order", ev.order.platform)
                } else {
                    let remaining = ev.order.amount_needed - ev.order.total_pledge;
                    format!(
                        "{} of {} pledged on the {} order, {remaining} to go",
                        ev.order.total_pledge, ev.order.amount_needed, ev.order.platform
                    )
                };
                push_to_users(&db, &push, &[ev.user_id.clone()], &title, &body).await;
            })
        });
    }
    {
        let db = db.clone();
        let push = push.clone();
        hooks.on_pledge_failed(move |ev| {
            let db = db.clone();
            let push = push.clone();
            Box::pin(async move {
                let title = "Pledge failed".to_string();
                let body = format!("Your pledge on order {} was not accepted ({})", ev.order_id, ev.reason);
                push_to_users(&db, &push, &[ev.user_id.clone()], &title, &body).await;
            })
        });
    }
    {
        let db = db.clone();
        let push = push.clone();
        hooks.on_order_completed(move |ev| {
            let db = db.clone();
            let push = push.clone();
            Box::pin(async move {
                let title = "Order complete! 🎉".to_string();
                let body = format!(
                    "The {} order hit {} with {} people. Check the app for everyone's numbers.",
                    ev.order.platform, ev.order.total_pledge, ev.order.total_users
                );
                push_to_users(&db, &push, &ev.order.participants(), &title, &body).await;
            })
        });
    }
    {
        let db = db.clone();
        hooks.on_order_expired(move |ev| {
            let db = db.clone();
            let push = push.clone();
            Box::pin(async move {
                let title = "Order expired".to_string();
                let body = format!("The {} order ran out of time. Your credit was returned.", ev.order.platform);
                push_to_users(&db, &push, &ev.order.participants(), &title, &body).await;
            })
        });
    }
    hooks
}

async fn push_to_users<P>(
    db: &SqliteDatabase,
    push: &P,
    users: &[bundl_engine::db_types::UserId],
    title: &str,
    body: &str,
) where
    P: PushSender,
{
    let tokens = match db.push_tokens_for(users).await {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!("📣️ Could not resolve push tokens: {e}");
            return;
        },
    };
    for token in tokens {
        push.send(&token, title, body).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn debug_otp_round_trip() {
        let provider = DebugOtpProvider::new();
        let tid = provider.begin_verification("+919876543212").await.unwrap();
        let phone = provider.complete_verification(&tid, "000000").await.unwrap();
        assert_eq!(phone, "+919876543212");
        // A transaction can only be completed once.
        let err = provider.complete_verification(&tid, "000000").await.unwrap_err();
        assert!(matches!(err, OtpError::UnknownTransaction));
    }

    #[tokio::test]
    async fn bad_phone_numbers_are_rejected() {
        let provider = DebugOtpProvider::new();
        for phone in ["9876543212", "+91abc", "+12", "+1234567890123456789"] {
            let err = provider.begin_verification(phone).await.unwrap_err();
            assert!(matches!(err, OtpError::InvalidPhoneNumber(_)), "{phone} should be invalid");
        }
    }
}
