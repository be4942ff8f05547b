use actix_web::{
    body::MessageBody,
    http::{header, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use chrono::Duration;
use serde_json::Value;
use topup_common::{Decimal, Money};
use topup_engine::{
    db_types::{Account, NewAccount, Order, OrderStatusType, PaymentMethod, Role},
    events::EventProducers,
    gateway::{RoboKassaClient, RoboKassaConfig},
    order_objects::{NewOrderRequest, Trust},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    OrderFlowApi,
    PaymentGatewayDatabase,
    ReferralApi,
    ReferralPolicy,
    SqliteDatabase,
};

use super::helpers::{get_auth_config, issue_token};
use crate::{
    auth::{JwtClaims, TokenVerifier},
    middleware::JwtMiddlewareFactory,
    routes::{ReferralStatsRoute, ValidateReferralCodeRoute},
};

struct Store {
    db: SqliteDatabase,
    orders: OrderFlowApi<SqliteDatabase, RoboKassaClient>,
    referrals: ReferralApi<SqliteDatabase>,
}

impl Store {
    async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = RoboKassaClient::new(RoboKassaConfig::new("demo", "password_1", "password_2"));
        let producers = EventProducers::default();
        let referrals = ReferralApi::new(db.clone(), ReferralPolicy::Fixed(Decimal::ONE), producers.clone());
        let orders = OrderFlowApi::new(db.clone(), gateway, referrals.clone(), producers);
        Self { db, orders, referrals }
    }

    async fn customer(&self, name: &str) -> Account {
        self.db.create_account(NewAccount::new(name)).await.expect("Error creating account")
    }

    async fn paid_order(&self, account_id: i64, amount: i64) -> Order {
        let product = self.db.upsert_catalog_product("Genshin Impact", "Welkin Moon").await.unwrap();
        let request = NewOrderRequest {
            game_id: product.game_id,
            product_id: product.id,
            amount: Money::from_whole_units(amount),
            currency: "RUB".to_string(),
            payment_method: PaymentMethod::Auto,
            comment: None,
            answers: Default::default(),
            paid: false,
        };
        let order = self.orders.create_order(account_id, request, Trust::Untrusted).await.unwrap().order;
        self.orders.update_order_status(order.id, OrderStatusType::Processing).await.unwrap()
    }

    async fn call(&self, req: TestRequest) -> (StatusCode, Value) {
        let verifier = TokenVerifier::new(&get_auth_config());
        let app = App::new()
            .app_data(web::Data::new(self.referrals.clone()))
            .service(web::scope("/guest").service(ValidateReferralCodeRoute::<SqliteDatabase>::new()))
            .service(
                web::scope("/api")
                    .wrap(JwtMiddlewareFactory::new(verifier))
                    .service(ReferralStatsRoute::<SqliteDatabase>::new()),
            );
        let service = test::init_service(app).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let body = res.into_body().try_into_bytes().unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }
}

#[actix_web::test]
async fn anyone_can_check_a_referral_code() {
    let store = Store::new().await;
    let referrer = store.customer("referrer").await;
    let code = store.referrals.referral_code(referrer.id).await.unwrap();

    let req = TestRequest::get().uri(&format!("/guest/referrals/validate-code/{}", code.to_lowercase()));
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["referral_code"], code.as_str());
    assert_eq!(body["referrer_username"], "referrer");

    let req = TestRequest::get().uri("/guest/referrals/validate-code/REFNOPE0000");
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Referral code REFNOPE0000 does not exist");
}

#[actix_web::test]
async fn referral_stats_list_recent_referral_orders() {
    let store = Store::new().await;
    let referrer = store.customer("referrer").await;
    let code = store.referrals.referral_code(referrer.id).await.unwrap();
    let bob = store.customer("bob").await;
    store.referrals.register_referral(bob.id, &code).await.unwrap();
    let first = store.paid_order(bob.id, 1500).await;
    let second = store.paid_order(bob.id, 250).await;

    let token = issue_token(JwtClaims::new(referrer.id, vec![Role::User]), Duration::hours(1));
    let req = TestRequest::get()
        .uri("/api/referrals/stats")
        .insert_header((header::AUTHORIZATION, format!("Bearer {token}")));
    let (status, stats) = store.call(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["referral_code"], code.as_str());
    assert_eq!(stats["paid_orders"], 2);
    assert_eq!(stats["total_earned"], "17.50");
    assert_eq!(stats["total_referral_amount"], "1750.00");
    let recent = stats["recent_referral_orders"].as_array().unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0]["id"], second.id.value());
    assert_eq!(recent[0]["amount"], "250.00");
    assert_eq!(recent[0]["currency"], "RUB");
    assert_eq!(recent[1]["id"], first.id.value());
}
