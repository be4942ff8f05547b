use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::Duration;
use log::debug;
use serde_json::Value;
use topup_engine::{db_types::Role, AccountApi};

use super::{
    helpers::{get_request, issue_token},
    mocks::{account, MockAccountManager},
};
use crate::{auth::JwtClaims, routes::MyAccountRoute};

#[actix_web::test]
async fn fetch_my_account_no_headers() {
    let _ = env_logger::try_init().ok();
    let err = get_request("", "/account", configure).await.expect_err("Expected error");
    assert_eq!(err, "Authentication Error. No bearer token was found in the request.");
}

#[actix_web::test]
async fn fetch_my_account_expired_token() {
    let _ = env_logger::try_init().ok();
    let claims = JwtClaims::new(7, vec![Role::User]);
    debug!("Calling /account with expired token {claims:?}");
    let token = issue_token(claims, Duration::hours(-1));
    let err = get_request(&token, "/account", configure).await.expect_err("Expected error");
    assert!(err.starts_with("Authentication Error. Access token is invalid."), "{err}");
}

#[actix_web::test]
async fn fetch_my_account_tampered_token() {
    let _ = env_logger::try_init().ok();
    let mut token = issue_token(JwtClaims::new(7, vec![Role::User]), Duration::hours(1));
    token.replace_range(token.len() - 10..token.len() - 5, "AAAAA");
    let err = get_request(&token, "/account", configure).await.expect_err("Expected error");
    assert!(err.starts_with("Authentication Error. Access token is invalid."), "{err}");
}

#[actix_web::test]
async fn fetch_my_account() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(JwtClaims::new(7, vec![Role::User]), Duration::hours(1));
    let (status, body) = get_request(&token, "/account", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::OK);
    let account: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(account["id"], 7);
    assert_eq!(account["balance"], "250.00");
    assert_eq!(account["referral_code"], "REFAB12CD34");
}

#[actix_web::test]
async fn fetch_deleted_account() {
    let _ = env_logger::try_init().ok();
    let token = issue_token(JwtClaims::new(99, vec![Role::User]), Duration::hours(1));
    let (status, body) = get_request(&token, "/account", configure).await.expect("Request failed");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Account #99 does not exist"}"#);
}

fn configure(cfg: &mut ServiceConfig) {
    let mut account_manager = MockAccountManager::new();
    account_manager
        .expect_fetch_account()
        .returning(|id| Ok(if id == 7 { Some(account(7)) } else { None }));
    let accounts_api = AccountApi::new(account_manager);
    cfg.service(MyAccountRoute::<MockAccountManager>::new()).app_data(web::Data::new(accounts_api));
}
