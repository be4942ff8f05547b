use actix_web::{
    body::MessageBody,
    http::{header, header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use serde_json::{json, Value};
use topup_common::Money;
use topup_engine::{
    db_types::{NewAccount, Order, OrderStatusType, PaymentMethod},
    events::EventProducers,
    gateway::{RoboKassaClient, RoboKassaConfig},
    order_objects::{NewOrderRequest, Trust},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    AccountManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    ReferralApi,
    ReferralPolicy,
    SqliteDatabase,
    WebhookApi,
};

use crate::{
    config::ServerOptions,
    routes::{payment_fail, payment_methods, payment_success, GuestBulkOrderRoute, PaymentResultRoute},
    server::json_config,
};

const FRONTEND_URL: &str = "https://shop.example.com";

struct Store {
    db: SqliteDatabase,
    gateway: RoboKassaClient,
    orders: OrderFlowApi<SqliteDatabase, RoboKassaClient>,
    webhooks: WebhookApi<SqliteDatabase, RoboKassaClient>,
}

impl Store {
    async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let config = RoboKassaConfig::new("demo", "password_1", "password_2").with_frontend_url(FRONTEND_URL);
        let gateway = RoboKassaClient::new(config);
        let producers = EventProducers::default();
        let referrals = ReferralApi::new(db.clone(), ReferralPolicy::FromEnv, producers.clone());
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), referrals.clone(), producers.clone());
        let webhooks = WebhookApi::new(db.clone(), gateway.clone(), referrals, producers);
        Self { db, gateway, orders, webhooks }
    }

    async fn pending_order(&self) -> Order {
        let account = self.db.create_account(NewAccount::new("alice")).await.expect("Error creating account");
        let product = self.db.upsert_catalog_product("Genshin Impact", "60 Genesis Crystals").await.unwrap();
        let request = NewOrderRequest {
            game_id: product.game_id,
            product_id: product.id,
            amount: Money::from_whole_units(1500),
            currency: "RUB".to_string(),
            payment_method: PaymentMethod::Sbp,
            comment: None,
            answers: Default::default(),
            paid: false,
        };
        self.orders.create_order(account.id, request, Trust::Untrusted).await.expect("Error creating order").order
    }

    /// A form body exactly as RoboKassa sends it, with `OutSum` carrying six decimals.
    fn result_form(&self, order: &Order, signature: Option<&str>) -> String {
        let out_sum = format!("{}0000", order.amount);
        let inv_id = order.id.value().to_string();
        let signature = signature.map(String::from).unwrap_or_else(|| self.gateway.sign_result(&out_sum, &inv_id, None));
        format!("OutSum={out_sum}&InvId={inv_id}&SignatureValue={signature}&EMail=alice%40example.com")
    }

    async fn status_of(&self, order: &Order) -> OrderStatusType {
        self.db.fetch_order_by_id(order.id).await.unwrap().expect("Order does not exist").status
    }

    async fn call(&self, req: TestRequest) -> (StatusCode, String) {
        let options = ServerOptions {
            use_x_forwarded_for: false,
            use_forwarded: false,
            frontend_url: FRONTEND_URL.to_string(),
        };
        let app = App::new()
            .app_data(web::Data::new(self.orders.clone()))
            .app_data(web::Data::new(self.webhooks.clone()))
            .app_data(web::Data::new(options))
            .app_data(json_config())
            .service(web::scope("/guest").service(GuestBulkOrderRoute::<SqliteDatabase, RoboKassaClient>::new()))
            .service(
                web::scope("/robokassa")
                    .service(payment_success)
                    .service(payment_fail)
                    .service(payment_methods)
                    .service(PaymentResultRoute::<SqliteDatabase, RoboKassaClient>::new()),
            );
        let service = test::init_service(app).await;
        let res = test::call_service(&service, req.to_request()).await;
        let status = res.status();
        let location = res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()).map(String::from);
        let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
        (status, location.unwrap_or(body))
    }
}

fn post_result(form: String) -> TestRequest {
    TestRequest::post().uri("/robokassa/result").insert_header(ContentType::form_url_encoded()).set_payload(form)
}

#[actix_web::test]
async fn payment_results_are_acknowledged_once_and_then_repeated() {
    let store = Store::new().await;
    let order = store.pending_order().await;
    assert_eq!(order.status, OrderStatusType::Pending);
    let expected = format!("OK{}", order.id.value());

    let (status, body) = store.call(post_result(store.result_form(&order, None))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);
    assert_eq!(store.status_of(&order).await, OrderStatusType::Processing);

    let (status, body) = store.call(post_result(store.result_form(&order, None))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);
    assert_eq!(store.status_of(&order).await, OrderStatusType::Processing);
}

#[actix_web::test]
async fn json_payment_results_are_accepted() {
    let store = Store::new().await;
    let order = store.pending_order().await;
    let out_sum = format!("{}", order.amount);
    let inv_id = order.id.value().to_string();
    let signature = store.gateway.sign_result(&out_sum, &inv_id, None);
    let req = TestRequest::post()
        .uri("/robokassa/result")
        .set_json(json!({ "OutSum": out_sum, "InvId": inv_id, "SignatureValue": signature }));
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("OK{inv_id}"));
}

#[actix_web::test]
async fn numeric_json_amounts_are_verified_as_sent() {
    let store = Store::new().await;
    let order = store.pending_order().await;
    let out_sum = format!("{}", order.amount);
    assert_eq!(out_sum, "1500.00");
    let inv_id = order.id.value();
    let signature = store.gateway.sign_result(&out_sum, &inv_id.to_string(), None);
    let body = format!(r#"{{"OutSum": {out_sum}, "InvId": {inv_id}, "SignatureValue": "{signature}"}}"#);
    let req = TestRequest::post().uri("/robokassa/result").insert_header(ContentType::json()).set_payload(body);
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("OK{inv_id}"));
    assert_eq!(store.status_of(&order).await, OrderStatusType::Processing);
}

#[actix_web::test]
async fn forged_payment_results_are_rejected() {
    let store = Store::new().await;
    let order = store.pending_order().await;
    let (status, body) = store.call(post_result(store.result_form(&order, Some("0123456789abcdef")))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid signature"}"#);
    assert_eq!(store.status_of(&order).await, OrderStatusType::Pending);
}

#[actix_web::test]
async fn incomplete_payment_results_are_rejected() {
    let store = Store::new().await;
    let (status, body) = store.call(post_result("OutSum=100.00&SignatureValue=abc".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid request: Invalid parameters"}"#);
}

#[actix_web::test]
async fn customers_are_redirected_to_their_order() {
    let store = Store::new().await;
    let req = TestRequest::get().uri("/robokassa/success?OutSum=1500.00&InvId=12&SignatureValue=abc");
    assert_eq!(store.call(req).await, (StatusCode::FOUND, format!("{FRONTEND_URL}/order/12?payment=success")));
    let req = TestRequest::get().uri("/robokassa/fail?OutSum=1500.00&InvId=12");
    assert_eq!(store.call(req).await, (StatusCode::FOUND, format!("{FRONTEND_URL}/order/12?payment=failed")));
    let req = TestRequest::get().uri("/robokassa/fail?InvId=not-a-number");
    assert_eq!(store.call(req).await, (StatusCode::FOUND, format!("{FRONTEND_URL}/")));
    let req = TestRequest::get().uri("/robokassa/success");
    assert_eq!(store.call(req).await, (StatusCode::FOUND, format!("{FRONTEND_URL}/")));
}

#[actix_web::test]
async fn hosted_payment_methods_are_listed() {
    let store = Store::new().await;
    let (status, body) = store.call(TestRequest::get().uri("/robokassa/methods")).await;
    assert_eq!(status, StatusCode::OK);
    let methods: Value = serde_json::from_str(&body).unwrap();
    let methods = methods.as_array().unwrap().iter().map(|m| m["method"].as_str().unwrap()).collect::<Vec<_>>();
    assert_eq!(methods, vec!["sberbank", "sbp"]);
}

#[actix_web::test]
async fn guests_check_out_with_an_email() {
    let store = Store::new().await;
    let product = store.db.upsert_catalog_product("Genshin Impact", "60 Genesis Crystals").await.unwrap();
    let item = json!({ "game_id": product.game_id, "product_id": product.id, "amount": "300", "payment_method": "sbp" });

    let req = TestRequest::post().uri("/guest/orders/bulk").set_json(json!({ "items": [item.clone()] }));
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"Invalid request: A valid contact email is required"}"#);

    let req = TestRequest::post()
        .uri("/guest/orders/bulk")
        .set_json(json!({ "items": [item.clone(), item], "email": "guest@example.com" }));
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["order"]["amount"], "600.00");
    assert_eq!(result["order"]["account_id"], Value::Null);
    assert!(result["payment_url"].as_str().is_some_and(|url| url.contains("InvId=")), "{body}");
}

#[actix_web::test]
async fn malformed_request_bodies_are_reported_as_json() {
    let store = Store::new().await;
    let req = TestRequest::post().uri("/guest/orders/bulk").set_json(json!({ "items": "everything" }));
    let (status, body) = store.call(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body).unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Could not read request body: "), "{error}");
}
