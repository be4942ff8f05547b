use std::{net::IpAddr, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use topup_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    gateway::RoboKassaClient,
    AccountApi,
    OrderFlowApi,
    ReferralApi,
    ReferralPolicy,
    SqliteDatabase,
    WebhookApi,
};

use crate::{
    auth::TokenVerifier,
    config::{ServerConfig, ServerOptions},
    errors::{AuthError, ServerError, ServerError::AuthenticationError},
    helpers::get_service_remote_ip,
    integrations::telegram::{register_telegram_hooks, TelegramNotifier},
    middleware::JwtMiddlewareFactory,
    routes::{
        health,
        payment_fail,
        payment_methods,
        payment_success,
        CancelOrderRoute,
        CreateBulkOrderRoute,
        CreateManualOrderRoute,
        CreateOrderRoute,
        GuestBulkOrderRoute,
        MarkOrderPaidRoute,
        MyAccountRoute,
        MyManualOrdersRoute,
        MyOrdersRoute,
        OrderByIdRoute,
        PaymentResultRoute,
        ReferralEarningsRoute,
        ReferralStatsRoute,
        RefundOrderRoute,
        RefundPaidOrderRoute,
        RegeneratePaymentUrlRoute,
        RegisterReferralRoute,
        SearchOrdersRoute,
        UpdateOrderStatusRoute,
        ValidateReferralCodeRoute,
    },
};

const MAX_DB_CONNECTIONS: u32 = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    info!("🚀️ Database is ready at {}", config.database_url);
    let hooks = create_event_hooks(&config)?;
    let handlers = EventHandlers::new(config.event_buffer_size, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

fn create_event_hooks(config: &ServerConfig) -> Result<EventHooks, ServerError> {
    let mut hooks = EventHooks::default();
    if let Some(telegram) = config.telegram.clone() {
        let notifier = TelegramNotifier::new(telegram).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        register_telegram_hooks(&mut hooks, notifier);
        info!("🚀️ Telegram notifications are enabled");
    }
    Ok(hooks)
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let bind_addr = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let gateway = RoboKassaClient::new(config.robokassa.clone());
        let referral_api = ReferralApi::new(db.clone(), ReferralPolicy::FromEnv, producers.clone())
            .with_frontend_url(&config.robokassa.frontend_url);
        let orders_api = OrderFlowApi::new(db.clone(), gateway.clone(), referral_api.clone(), producers.clone());
        let webhook_api = WebhookApi::new(db.clone(), gateway, referral_api.clone(), producers.clone());
        let accounts_api = AccountApi::new(db.clone());
        let options = ServerOptions::from_config(&config);
        let verifier = TokenVerifier::new(&config.auth);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("topup::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(webhook_api))
            .app_data(web::Data::new(referral_api))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(options))
            .app_data(json_config());
        let admin_scope = web::scope("/admin")
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(UpdateOrderStatusRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(MarkOrderPaidRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(RefundOrderRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(RefundPaidOrderRoute::<SqliteDatabase, RoboKassaClient>::new());
        // Routes that require authentication
        let auth_scope = web::scope("/api")
            .wrap(JwtMiddlewareFactory::new(verifier))
            .service(admin_scope)
            .service(CreateOrderRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(CreateManualOrderRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(CreateBulkOrderRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(MyOrdersRoute::<SqliteDatabase>::new())
            .service(MyManualOrdersRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(RegeneratePaymentUrlRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(MyAccountRoute::<SqliteDatabase>::new())
            .service(ReferralStatsRoute::<SqliteDatabase>::new())
            .service(ReferralEarningsRoute::<SqliteDatabase>::new())
            .service(RegisterReferralRoute::<SqliteDatabase>::new());
        let guest_scope = web::scope("/guest")
            .service(GuestBulkOrderRoute::<SqliteDatabase, RoboKassaClient>::new())
            .service(ValidateReferralCodeRoute::<SqliteDatabase>::new());
        // Customers' browsers land on the redirect routes, so only the result callback is held to the whitelist.
        let callback_scope = whitelisted_scope(&config)
            .service(PaymentResultRoute::<SqliteDatabase, RoboKassaClient>::new());
        let robokassa_scope = web::scope("/robokassa")
            .service(payment_success)
            .service(payment_fail)
            .service(payment_methods)
            .service(callback_scope);
        app.service(health).service(auth_scope).service(guest_scope).service(robokassa_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((bind_addr.0.as_str(), bind_addr.1))?
    .run();
    Ok(srv)
}

/// Malformed JSON bodies are reported in the same `{"error": ...}` shape as every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| ServerError::InvalidRequestBody(err.to_string()).into())
}

fn whitelisted_scope(
    config: &ServerConfig,
) -> actix_web::Scope<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let use_x_forwarded_for = config.use_x_forwarded_for;
    let use_forwarded = config.use_forwarded;
    let whitelist = config.robokassa_whitelist.clone();
    web::scope("").wrap_fn(move |req, srv| {
        // Collect peer IP from x-forwarded-for, or forwarded headers _if_ `use_nnn` has been set to true
        // in the configuration. Otherwise, use the peer address from the connection info.
        let peer_ip = get_service_remote_ip(&req, use_x_forwarded_for, use_forwarded);
        if is_whitelisted(peer_ip, whitelist.as_deref()) {
            srv.call(req)
        } else {
            ok(req.error_response(AuthenticationError(AuthError::ForbiddenPeer))).boxed_local()
        }
    })
}

fn is_whitelisted(peer_ip: Option<IpAddr>, whitelist: Option<&[IpAddr]>) -> bool {
    match (peer_ip, whitelist) {
        (_, None) => true,
        (Some(ip), Some(whitelist)) => {
            let allowed = whitelist.contains(&ip);
            if allowed {
                info!("💻️ RoboKassa callback from {ip}");
            } else {
                warn!("💻️ RoboKassa callback from {ip}, which is not whitelisted. Denying access.");
            }
            allowed
        },
        (None, Some(_)) => {
            warn!("💻️ No IP address found in RoboKassa remote peer request, denying access.");
            false
        },
    }
}
