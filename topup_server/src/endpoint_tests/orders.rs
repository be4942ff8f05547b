use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Duration;
use serde_json::Value;
use topup_engine::{
    db_types::{OrderId, OrderStatusType, Role},
    AccountApi,
};

use super::{
    helpers::{get_request, issue_token},
    mocks::{order, MockAccountManager},
};
use crate::{
    auth::JwtClaims,
    routes::{MyManualOrdersRoute, MyOrdersRoute, OrderByIdRoute},
};

#[actix_web::test]
async fn fetch_my_orders_no_headers() {
    let _ = env_logger::try_init().ok();
    let err = get_request("", "/orders", configure).await.expect_err("Expected error");
    assert_eq!(err, "Authentication Error. No bearer token was found in the request.");
}

#[actix_web::test]
async fn fetch_my_orders() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::User]);
    let (status, body) = get_request(&token, "/orders", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["total_orders"], "250.00");
    assert_eq!(result["orders"].as_array().map(Vec::len), Some(2));
    assert_eq!(result["orders"][0]["status"], "paid");
    assert_eq!(result["orders"][1]["status"], "canceled");
}

#[actix_web::test]
async fn fetch_my_manual_orders() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::User]);
    let (status, body) = get_request(&token, "/orders/manual", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["orders"][0]["manual_game_name"], "Lost Ark");
}

#[actix_web::test]
async fn fetch_my_order_by_id() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(1, vec![Role::User]);
    let (status, body) = get_request(&token, "/orders/1", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["id"], 1);
    assert_eq!(result["amount"], "100.00");
}

#[actix_web::test]
async fn someone_elses_order_looks_like_a_missing_one() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(2, vec![Role::User]);
    let (status, body) = get_request(&token, "/orders/1", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (missing_status, missing_body) = get_request(&token, "/orders/404", configure).await.expect("Request failed");
    assert_eq!(missing_status, StatusCode::NOT_FOUND);
    assert_eq!(body.replace("#1", "#404"), missing_body);
}

#[actix_web::test]
async fn admins_can_fetch_any_order() {
    let _ = env_logger::try_init().ok();
    let token = valid_token(2, vec![Role::User, Role::Admin]);
    let (status, body) = get_request(&token, "/orders/1", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(result["account_id"], 1);
}

fn valid_token(account_id: i64, roles: Vec<Role>) -> String {
    issue_token(JwtClaims::new(account_id, roles), Duration::days(1))
}

fn configure(cfg: &mut ServiceConfig) {
    let mut account_manager = MockAccountManager::new();
    account_manager.expect_fetch_orders_for_account().returning(|account_id| {
        Ok(vec![order(1, account_id, 100, OrderStatusType::Paid), order(2, account_id, 150, OrderStatusType::Canceled)])
    });
    account_manager.expect_fetch_manual_orders_for_account().returning(|account_id| {
        let mut manual = order(3, account_id, 500, OrderStatusType::Pending);
        manual.manual_game_name = Some("Lost Ark".to_string());
        Ok(vec![manual])
    });
    account_manager.expect_fetch_order_by_id().returning(|id| {
        Ok(match id {
            OrderId(1) => Some(order(1, 1, 100, OrderStatusType::Paid)),
            _ => None,
        })
    });
    let accounts_api = AccountApi::new(account_manager);
    cfg.service(MyOrdersRoute::<MockAccountManager>::new())
        .service(MyManualOrdersRoute::<MockAccountManager>::new())
        .service(OrderByIdRoute::<MockAccountManager>::new())
        .app_data(web::Data::new(accounts_api));
}
