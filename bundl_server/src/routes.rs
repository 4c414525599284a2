//! Request handler definitions
//!
//! Define each route and its handler here. Handlers stay thin: extract the authenticated user, validate the DTO,
//! call the engine, map the result. No business logic.
//!
//! Handlers are generic over the storage seams so the endpoint tests can swap mocks in; the server registers them
//! with the concrete SQLite/Redis backends via the `configure_*` functions at the bottom.
use actix_web::{get, web, web::ServiceConfig, HttpResponse, Responder};
use bundl_common::Money;
use bundl_engine::{
    db_types::OrderId,
    traits::{CreditLedger, LiveOrderCache, OrderArchive, OtpError, OtpProvider, UserDirectory},
    LedgerApi, OrderFlowApi,
};
use log::*;

use crate::{
    auth::{JwtClaims, TokenIssuer},
    config::ServerConfig,
    data_objects::{
        ActiveOrdersQuery, AuthResponse, BalanceResponse, CreateOrderParams, JsonResponse, PledgeOrderParams,
        SendOtpParams, SendOtpResponse, UpdatePushTokenParams, VerifyOtpParams,
    },
    errors::{AuthError, ServerError},
};

// ----------------------------------------------   Health  ----------------------------------------------------

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------

/// Route handler for the createOrder endpoint
///
/// Opens a new group order at the given location. Costs one credit; the credit is returned if the order cannot be
/// created. Returns the full order snapshot with status 201.
pub async fn create_order<B, C>(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<B, C>>,
    body: web::Json<CreateOrderParams>,
) -> Result<HttpResponse, ServerError>
where
    B: CreditLedger + UserDirectory + OrderArchive + 'static,
    C: LiveOrderCache + 'static,
{
    let params = body.into_inner();
    debug!("💻️ POST createOrder by {} on {}", claims.user_id, params.platform);
    let order = api.create_order(&claims.user_id, params.into_new_order()).await.map_err(|e| {
        debug!("💻️ Could not create order. {e}");
        e
    })?;
    Ok(HttpResponse::Created().json(order))
}

/// Route handler for the pledgeToOrder endpoint
///
/// Adds the caller's pledge to an ACTIVE order. Costs one credit; every refusal (unknown order, already complete,
/// no longer active) refunds it. When the pledge completes the order, the response additionally carries the
/// participants' phone-number map.
pub async fn pledge_to_order<B, C>(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<B, C>>,
    body: web::Json<PledgeOrderParams>,
) -> Result<HttpResponse, ServerError>
where
    B: CreditLedger + UserDirectory + OrderArchive + 'static,
    C: LiveOrderCache + 'static,
{
    let PledgeOrderParams { order_id, pledge_amount } = body.into_inner();
    debug!("💻️ POST pledgeToOrder by {} on {order_id}", claims.user_id);
    let receipt =
        api.pledge_to_order(&claims.user_id, &order_id, Money::from(pledge_amount)).await.map_err(|e| {
            debug!("💻️ Pledge refused. {e}");
            e
        })?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// Route handler for the activeOrders endpoint
///
/// Best-effort discovery of ACTIVE orders around a point. The snapshot list may be slightly stale but never
/// contains completed or expired orders. Free of charge.
pub async fn active_orders<B, C>(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<B, C>>,
    query: web::Query<ActiveOrdersQuery>,
) -> Result<HttpResponse, ServerError>
where
    B: CreditLedger + UserDirectory + OrderArchive + 'static,
    C: LiveOrderCache + 'static,
{
    let ActiveOrdersQuery { latitude, longitude, radius_km } = query.into_inner();
    debug!("💻️ GET activeOrders for {} around ({latitude}, {longitude})", claims.user_id);
    let orders = api.active_orders_near(latitude, longitude, radius_km).await.map_err(|e| {
        debug!("💻️ Could not fetch active orders. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(orders))
}

/// Route handler for the orderStatus endpoint
///
/// A participant's view of one order. Non-participants receive 404, indistinguishable from a missing order. While
/// the order is ACTIVE the pledge map is redacted to the caller's own entry; COMPLETED orders carry the phone-number
/// map, EXPIRED ones a note that the credit came back.
pub async fn order_status<B, C>(
    claims: JwtClaims,
    api: web::Data<OrderFlowApi<B, C>>,
    path: web::Path<OrderId>,
) -> Result<HttpResponse, ServerError>
where
    B: CreditLedger + UserDirectory + OrderArchive + 'static,
    C: LiveOrderCache + 'static,
{
    let order_id = path.into_inner();
    debug!("💻️ GET orderStatus({order_id}) for {}", claims.user_id);
    let view = api.order_status(&claims.user_id, &order_id).await.map_err(|e| {
        debug!("💻️ Could not fetch order status. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(view))
}

//----------------------------------------------   Credits  ----------------------------------------------------

/// Route handler for the balance endpoint
///
/// Read-only view of the caller's credit balance. Top-ups run through the external IAP webhook, never through
/// this server.
pub async fn credit_balance<B>(
    claims: JwtClaims,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError>
where B: CreditLedger + UserDirectory + 'static {
    debug!("💻️ GET balance for {}", claims.user_id);
    let credits = api.balance(&claims.user_id).await.map_err(|e| {
        debug!("💻️ Could not fetch balance. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    Ok(HttpResponse::Ok().json(BalanceResponse { credits }))
}

//----------------------------------------------   Auth  ----------------------------------------------------

/// Route handler for the sendOtp endpoint
///
/// Starts a phone verification through the configured OTP provider and returns the transaction id the client must
/// quote on verifyOtp. This route is unauthenticated.
pub async fn send_otp<O>(body: web::Json<SendOtpParams>, otp: web::Data<O>) -> Result<HttpResponse, ServerError>
where O: OtpProvider + 'static {
    let phone_number = body.into_inner().phone_number;
    trace!("💻️ Received OTP request");
    let tid = otp.begin_verification(&phone_number).await.map_err(|e| {
        debug!("💻️ Could not begin phone verification. {e}");
        match e {
            e @ OtpError::InvalidPhoneNumber(_) => ServerError::InvalidRequestBody(e.to_string()),
            e => ServerError::BackendError(e.to_string()),
        }
    })?;
    Ok(HttpResponse::Ok().json(SendOtpResponse { tid }))
}

/// Route handler for the verifyOtp endpoint
///
/// Completes a phone verification. On first verification the user record is created with the configured starting
/// credits. Returns a bearer access token plus the user record. This route is unauthenticated.
pub async fn verify_otp<B, O>(
    body: web::Json<VerifyOtpParams>,
    otp: web::Data<O>,
    ledger: web::Data<LedgerApi<B>>,
    issuer: web::Data<TokenIssuer>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError>
where
    B: CreditLedger + UserDirectory + 'static,
    O: OtpProvider + 'static,
{
    let VerifyOtpParams { tid, otp: code, fcm_token } = body.into_inner();
    let phone_number = otp.complete_verification(&tid, &code).await.map_err(|e| {
        debug!("💻️ Phone verification failed. {e}");
        AuthError::OtpFailure(e.to_string())
    })?;
    let mut user = ledger.register_verified_user(&phone_number, config.default_user_credits).await.map_err(|e| {
        debug!("💻️ Could not provision user. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    if let Some(token) = fcm_token {
        match ledger.update_push_token(&user.user_id, &token).await {
            Ok(()) => user.push_token = Some(token),
            Err(e) => warn!("💻️ Could not store push token for {}: {e}", user.user_id),
        }
    }
    let access_token =
        issuer.issue_token(JwtClaims { user_id: user.user_id.clone(), phone_number: user.phone_number.clone() })?;
    Ok(HttpResponse::Ok().json(AuthResponse { access_token, user }))
}

/// Route handler for the updatePushToken endpoint
///
/// Stores the caller's push delivery handle. Users without one simply never receive pushes.
pub async fn update_push_token<B>(
    claims: JwtClaims,
    ledger: web::Data<LedgerApi<B>>,
    body: web::Json<UpdatePushTokenParams>,
) -> Result<HttpResponse, ServerError>
where B: CreditLedger + UserDirectory + 'static {
    let UpdatePushTokenParams { push_token } = body.into_inner();
    debug!("💻️ POST updatePushToken for {}", claims.user_id);
    ledger.update_push_token(&claims.user_id, &push_token).await.map_err(|e| {
        debug!("💻️ Could not update push token. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    Ok(HttpResponse::Ok().json(JsonResponse::success("Push token updated.")))
}

//----------------------------------------------   Registration  ----------------------------------------------

pub fn configure_orders<B, C>(cfg: &mut ServiceConfig)
where
    B: CreditLedger + UserDirectory + OrderArchive + 'static,
    C: LiveOrderCache + 'static,
{
    cfg.service(
        web::scope("/orders")
            .route("/createOrder", web::post().to(create_order::<B, C>))
            .route("/pledgeToOrder", web::post().to(pledge_to_order::<B, C>))
            .route("/activeOrders", web::get().to(active_orders::<B, C>))
            .route("/orderStatus/{order_id}", web::get().to(order_status::<B, C>)),
    );
}

pub fn configure_credits<B>(cfg: &mut ServiceConfig)
where B: CreditLedger + UserDirectory + 'static {
    cfg.service(web::scope("/credits").route("/balance", web::get().to(credit_balance::<B>)));
}

pub fn configure_auth<B, O>(cfg: &mut ServiceConfig)
where
    B: CreditLedger + UserDirectory + 'static,
    O: OtpProvider + 'static,
{
    cfg.service(
        web::scope("/auth")
            .route("/sendOtp", web::post().to(send_otp::<O>))
            .route("/verifyOtp", web::post().to(verify_otp::<B, O>))
            .route("/updatePushToken", web::post().to(update_push_token::<B>)),
    );
}
