//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every handler here awaits the database or the payment gateway
//! instead, so workers keep serving other requests while they wait.
//!
//! Route paths are relative to the scope they are registered in (see [`crate::server`]). Order matters within a scope:
//! `/orders/manual` must be registered before `/orders/{order_id}`, or the literal segment would be read as an id.
use actix_web::{get, http::header, web, HttpRequest, HttpResponse, Responder};
use log::*;
use serde_json::json;
use topup_engine::{
    db_types::{OrderId, PaymentMethod, Role},
    gateway::{PaymentGateway, WebhookPayload},
    order_objects::{BulkOrderRequest, GuestBulkOrderRequest, ManualOrderRequest, NewOrderRequest, Trust},
    traits::{AccountManagement, PaymentGatewayDatabase, ReferralManagement},
    AccountApi,
    OrderFlowApi,
    OrderFlowError,
    OrderResult,
    ReferralApi,
    WebhookApi,
};

use crate::{
    auth::JwtClaims,
    config::ServerOptions,
    data_objects::{
        GatewayRedirectParams,
        OrderSearchParams,
        PaymentMethodInfo,
        RefundRequest,
        RegisterReferralRequest,
        StatusUpdateRequest,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro.
//
// * `requires [roles]` registers a plain handler behind the ACL middleware.
// * `impl Bounds, ..` registers a handler generic over the backend `B`.
// * `gateway impl Bounds, ..` registers a handler generic over the backend `B` and the payment gateway `G`.
//
// The generic forms take an optional `where requires [roles]` suffix.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal requires [$($roles:expr),+]) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name)
                        .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal gateway impl $($bounds:ty),+ $(where requires [$($roles:expr),+])?) => {
        paste::paste! { pub struct [<$name:camel Route>]<B, G>(core::marker::PhantomData<fn() -> (B, G)>);}
        paste::paste! { impl<B, G> [<$name:camel Route>]<B, G> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> (B, G)>)
            }
        }}
        paste::paste! { impl<B, G> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B, G>
        where
            B: $($bounds +)+ 'static,
            G: topup_engine::gateway::PaymentGateway + 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B, G>)
                    $(.wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+])))?;
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ $(where requires [$($roles:expr),+])?) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>)
                    $(.wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+])))?;
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   RoboKassa  ----------------------------------------------------
route!(payment_result => Post "/result" gateway impl PaymentGatewayDatabase, ReferralManagement);
/// The ResultURL callback.
///
/// RoboKassa posts the payment result here, usually as a form, sometimes as JSON. The reply body must be exactly
/// `OK{InvId}`, or RoboKassa keeps delivering the notification. Repeat deliveries of a processed payment receive the
/// same reply and change nothing.
pub async fn payment_result<B, G>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<WebhookApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let content_type = req.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let payload = WebhookPayload::parse(content_type, &body)?;
    info!("💻️ Payment result received for invoice {} ({})", payload.inv_id, payload.out_sum);
    let outcome = api.process_payment_result(payload).await.map_err(|e| {
        warn!("💻️ Payment result was rejected. {e}");
        e
    })?;
    debug!("💻️ Payment result handled: {:?}", outcome.order().status);
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(outcome.acknowledgement()))
}

/// The SuccessURL redirect. RoboKassa sends the customer here after a successful payment.
#[get("/success")]
pub async fn payment_success(
    query: web::Query<GatewayRedirectParams>,
    options: web::Data<ServerOptions>,
) -> impl Responder {
    redirect_to_order(&options.frontend_url, query.into_inner(), "success")
}

/// The FailURL redirect. RoboKassa sends the customer here when they abandon or fail a payment.
#[get("/fail")]
pub async fn payment_fail(query: web::Query<GatewayRedirectParams>, options: web::Data<ServerOptions>) -> impl Responder {
    redirect_to_order(&options.frontend_url, query.into_inner(), "failed")
}

fn redirect_to_order(frontend_url: &str, params: GatewayRedirectParams, outcome: &str) -> HttpResponse {
    let base = frontend_url.trim_end_matches('/');
    let order_id = params.inv_id.as_deref().and_then(|s| s.trim().parse::<i64>().ok()).filter(|id| *id > 0);
    let location = match order_id {
        Some(id) => format!("{base}/order/{id}?payment={outcome}"),
        None => {
            debug!("💻️ Gateway redirect without a usable InvId ({:?}). Sending the customer home.", params.inv_id);
            format!("{base}/")
        },
    };
    trace!("💻️ Redirecting customer to {location}");
    HttpResponse::Found().insert_header((header::LOCATION, location)).finish()
}

/// Lists the payment methods that are paid on the hosted RoboKassa page.
#[get("/methods")]
pub async fn payment_methods() -> impl Responder {
    let methods =
        PaymentMethod::hosted_gateway_methods().into_iter().map(PaymentMethodInfo::for_method).collect::<Vec<_>>();
    HttpResponse::Ok().json(methods)
}

//----------------------------------------------   Guest checkout  ----------------------------------------------------
route!(guest_bulk_order => Post "/orders/bulk" gateway impl PaymentGatewayDatabase, ReferralManagement);
/// Checkout for customers without an account. A contact email is required; the guest's name is optional.
pub async fn guest_bulk_order<B, G>(
    body: web::Json<GuestBulkOrderRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let request = body.into_inner();
    debug!("💻️ Guest order for {} item(s)", request.items.len());
    let result = api.create_guest_bulk_order(request).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(validate_referral_code => Get "/referrals/validate-code/{referral_code}" impl PaymentGatewayDatabase, ReferralManagement);
/// Lets a visitor check a referral code before signing up.
pub async fn validate_referral_code<B>(
    path: web::Path<String>,
    api: web::Data<ReferralApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
{
    let code = path.into_inner();
    debug!("💻️ GET validate referral code {code}");
    let owner = api.validate_code(&code).await?.ok_or(OrderFlowError::ReferralCodeNotFound(code))?;
    Ok(HttpResponse::Ok().json(json!({
        "valid": true,
        "referral_code": owner.referral_code,
        "referrer_username": owner.referrer_username,
    })))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" gateway impl PaymentGatewayDatabase, ReferralManagement);
/// Places a single catalog order for the signed-in customer.
///
/// Hosted gateway methods get a payment URL in the response. If the gateway could not be reached, the order is still
/// created and the response carries a warning instead; the customer can ask for a new link later.
pub async fn create_order<B, G>(
    claims: JwtClaims,
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let trust = if claims.is_admin() { Trust::Trusted } else { Trust::Untrusted };
    debug!("💻️ POST order for account #{}", claims.account_id);
    let result = api.create_order(claims.account_id, body.into_inner(), trust).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(create_manual_order => Post "/orders/manual" gateway impl PaymentGatewayDatabase, ReferralManagement);
pub async fn create_manual_order<B, G>(
    claims: JwtClaims,
    body: web::Json<ManualOrderRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    debug!("💻️ POST manual order for account #{}", claims.account_id);
    let result = api.create_manual_order(claims.account_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(create_bulk_order => Post "/orders/bulk" gateway impl PaymentGatewayDatabase, ReferralManagement);
pub async fn create_bulk_order<B, G>(
    claims: JwtClaims,
    body: web::Json<BulkOrderRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    debug!("💻️ POST bulk order for account #{}", claims.account_id);
    let result = api.create_bulk_order(claims.account_id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

route!(my_orders => Get "/orders" impl AccountManagement);
/// Authenticated users fetch their own orders, newest first. The account id is taken from the access token.
pub async fn my_orders<B: AccountManagement>(
    claims: JwtClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_orders for account #{}", claims.account_id);
    let orders = api.orders_for_account(claims.account_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(my_manual_orders => Get "/orders/manual" impl AccountManagement);
pub async fn my_manual_orders<B: AccountManagement>(
    claims: JwtClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET my_manual_orders for account #{}", claims.account_id);
    let orders = api.manual_orders_for_account(claims.account_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_id => Get "/orders/{order_id}" impl AccountManagement);
/// Use `/orders/{order_id}` to fetch a specific order.
///
/// Customers only see their own orders. Any other order id gives a 404, whether the order exists or not. Admins can
/// retrieve any order.
pub async fn order_by_id<B: AccountManagement>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order_by_id({order_id})");
    let order = api
        .order_by_id(order_id)
        .await?
        .filter(|o| claims.is_admin() || o.is_owned_by(claims.account_id))
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Post "/orders/{order_id}/cancel" gateway impl PaymentGatewayDatabase, ReferralManagement);
/// Customers cancel their own pending orders. Whatever was charged to the account balance is returned to it.
pub async fn cancel_order<B, G>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    info!("💻️ Cancel request for order {order_id} from account #{}", claims.account_id);
    let order = api.cancel_order(order_id, claims.account_id).await.map_err(|e| {
        debug!("💻️ Could not cancel order. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(order))
}

route!(regenerate_payment_url => Post "/orders/{order_id}/payment_url" gateway impl PaymentGatewayDatabase, ReferralManagement);
pub async fn regenerate_payment_url<B, G>(
    claims: JwtClaims,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    debug!("💻️ New payment link requested for order {order_id}");
    let order = api.regenerate_payment_url(order_id, claims.account_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "order_id": order.id, "payment_url": order.payment_url })))
}

//----------------------------------------------   Account  ----------------------------------------------------
route!(my_account => Get "/account" impl AccountManagement);
/// The signed-in customer's account: balance, referral code and referral totals.
pub async fn my_account<B: AccountManagement>(
    claims: JwtClaims,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET account #{}", claims.account_id);
    let account = api
        .account_by_id(claims.account_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Account #{} does not exist", claims.account_id)))?;
    Ok(HttpResponse::Ok().json(account))
}

//----------------------------------------------   Referrals  ----------------------------------------------------
route!(referral_stats => Get "/referrals/stats" impl PaymentGatewayDatabase, ReferralManagement);
pub async fn referral_stats<B>(claims: JwtClaims, api: web::Data<ReferralApi<B>>) -> Result<HttpResponse, ServerError>
where B: PaymentGatewayDatabase + ReferralManagement {
    debug!("💻️ GET referral stats for account #{}", claims.account_id);
    let stats = api.referral_stats(claims.account_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(referral_earnings => Get "/referrals/earnings" impl PaymentGatewayDatabase, ReferralManagement);
pub async fn referral_earnings<B>(claims: JwtClaims, api: web::Data<ReferralApi<B>>) -> Result<HttpResponse, ServerError>
where B: PaymentGatewayDatabase + ReferralManagement {
    debug!("💻️ GET referral earnings for account #{}", claims.account_id);
    let earnings = api.earnings_for_referrer(claims.account_id).await?;
    Ok(HttpResponse::Ok().json(earnings))
}

route!(register_referral => Post "/referrals/register" impl PaymentGatewayDatabase, ReferralManagement);
/// Links the signed-in customer to the owner of a referral code. An account can be referred once, and never by
/// itself.
pub async fn register_referral<B>(
    claims: JwtClaims,
    body: web::Json<RegisterReferralRequest>,
    api: web::Data<ReferralApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
{
    let RegisterReferralRequest { referral_code } = body.into_inner();
    info!("💻️ Account #{} is registering referral code {referral_code}", claims.account_id);
    let account = api.register_referral(claims.account_id, &referral_code).await?;
    Ok(HttpResponse::Ok().json(account))
}

//----------------------------------------------   Admin  ----------------------------------------------------
route!(search_orders => Get "/orders" impl AccountManagement where requires [Role::Admin]);
/// Admins search every order. See [`OrderSearchParams`] for the query parameters.
pub async fn search_orders<B: AccountManagement>(
    query: web::Query<OrderSearchParams>,
    api: web::Data<AccountApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let filter = query.into_inner().into_filter().map_err(ServerError::InvalidRequestPath)?;
    debug!("💻️ GET orders search for {filter:?}");
    let orders = api.search_orders(filter).await?;
    Ok(HttpResponse::Ok().json(OrderResult::new(orders)))
}

route!(update_order_status => Patch "/orders/{order_id}/status" gateway impl PaymentGatewayDatabase, ReferralManagement where requires [Role::Admin]);
/// Moves an order along the order state machine. Illegal transitions are rejected with a 409.
pub async fn update_order_status<B, G>(
    path: web::Path<OrderId>,
    body: web::Json<StatusUpdateRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    let StatusUpdateRequest { status } = body.into_inner();
    info!("💻️ Status update for order {order_id} to {status}");
    let order = api.update_order_status(order_id, status).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(mark_order_paid => Post "/orders/{order_id}/mark_paid" gateway impl PaymentGatewayDatabase, ReferralManagement where requires [Role::Admin]);
/// Confirms payment for a pending order that was settled outside the hosted gateway.
pub async fn mark_order_paid<B, G>(
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    info!("💻️ Admin is marking order {order_id} as paid");
    let (order, referral) = api.mark_order_paid(order_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "order": order, "referral": referral })))
}

route!(refund_order => Post "/orders/{order_id}/refund" gateway impl PaymentGatewayDatabase, ReferralManagement where requires [Role::Admin]);
/// Cancels a pending order and credits `amount` back to the customer's balance.
pub async fn refund_order<B, G>(
    path: web::Path<OrderId>,
    body: web::Json<RefundRequest>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    let RefundRequest { amount } = body.into_inner();
    info!("💻️ Admin is refunding {amount} on order {order_id}");
    let order = api.refund_order(order_id, amount).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(refund_paid_order => Post "/orders/{order_id}/refund_paid" gateway impl PaymentGatewayDatabase, ReferralManagement where requires [Role::Admin]);
/// Cancels a paid or processing order and returns the full amount to the customer's balance.
pub async fn refund_paid_order<B, G>(
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    let order_id = path.into_inner();
    info!("💻️ Admin is refunding paid order {order_id} in full");
    let order = api.refund_paid_order(order_id).await?;
    Ok(HttpResponse::Ok().json(order))
}
