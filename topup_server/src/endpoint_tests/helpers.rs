use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web::ServiceConfig, App};
use chrono::Duration;
use log::debug;

use crate::{
    auth::{JwtClaims, TokenIssuer, TokenVerifier},
    config::AuthConfig,
    middleware::JwtMiddlewareFactory,
};

// Creates a test `AuthConfig` for issuing tokens. DO NOT re-use this secret anywhere.
pub fn get_auth_config() -> AuthConfig {
    AuthConfig::new("endpoint-tests-only-secret-7f3c9a1e5b2d4c8e")
}

pub fn issue_token(claims: JwtClaims, lifetime: Duration) -> String {
    TokenIssuer::new(&get_auth_config()).issue_token(claims, Some(lifetime)).expect("Failed to sign token")
}

pub async fn get_request(
    token: &str,
    path: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    send_request(TestRequest::get().uri(path), token, configure).await
}

pub async fn post_request(
    token: &str,
    path: &str,
    body: serde_json::Value,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    send_request(TestRequest::post().uri(path).set_json(body), token, configure).await
}

/// Calls a single request on an app that has the bearer token middleware in front of the routes from `configure`.
/// Middleware rejections come back as `Err`; handler errors are rendered into the response.
pub async fn send_request(
    req: TestRequest,
    token: &str,
    configure: fn(&mut ServiceConfig),
) -> Result<(StatusCode, String), String> {
    let mut req = req;
    if !token.is_empty() {
        req = req.insert_header(("Authorization", format!("Bearer {token}")));
    }
    let req = req.to_request();
    let verifier = TokenVerifier::new(&get_auth_config());
    let app = App::new().wrap(JwtMiddlewareFactory::new(verifier)).configure(configure);

    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) = test::try_call_service(&service, req).await.map_err(|e| e.to_string())?.into_parts();
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    Ok((status, body))
}
