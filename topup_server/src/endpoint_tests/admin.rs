use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Duration;
use serde_json::Value;
use topup_engine::{
    db_types::{OrderStatusType, PaymentMethod, Role},
    AccountApi,
};

use super::{
    helpers::{get_request, issue_token},
    mocks::{order, MockAccountManager},
};
use crate::{auth::JwtClaims, routes::SearchOrdersRoute};

#[actix_web::test]
async fn customers_cannot_search_orders() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(JwtClaims::new(1, vec![Role::User]), Duration::hours(1));
    let err = get_request(&token, "/orders", configure).await.expect_err("Request should have failed");
    assert_eq!(err, "Insufficient Permissions. This route requires more privileges");
}

#[actix_web::test]
async fn admins_search_orders() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(JwtClaims::new(1, vec![Role::Admin]), Duration::hours(1));
    let path = "/orders?account_id=5&status=pending,processing&payment_method=sbp";
    let (status, body) = get_request(&token, path, configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let orders: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(orders["orders"][0]["account_id"], 5);
    assert_eq!(orders["total_orders"], "300.00");
}

#[actix_web::test]
async fn unknown_statuses_are_rejected() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(JwtClaims::new(1, vec![Role::Admin]), Duration::hours(1));
    let (status, body) = get_request(&token, "/orders?status=lost", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Unknown order status(es): lost"), "{body}");
}

fn configure(cfg: &mut ServiceConfig) {
    let mut account_manager = MockAccountManager::new();
    account_manager
        .expect_search_orders()
        .withf(|q| {
            q.account_id == Some(5) &&
                q.payment_method == Some(PaymentMethod::Sbp) &&
                q.status == Some(vec![OrderStatusType::Pending, OrderStatusType::Processing])
        })
        .returning(|_| Ok(vec![order(10, 5, 300, OrderStatusType::Processing)]));
    let accounts_api = AccountApi::new(account_manager);
    cfg.service(SearchOrdersRoute::<MockAccountManager>::new()).app_data(web::Data::new(accounts_api));
}
