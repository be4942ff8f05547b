//! Bearer token handling.
//!
//! Access tokens are HS256 JWTs issued by the storefront's authentication service, which shares
//! [`AuthConfig::jwt_secret`] with this server. The server only ever validates them. [`TokenIssuer`] exists for tooling
//! and tests.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::Duration;
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    prelude::*,
};
use log::debug;
use serde::{Deserialize, Serialize};
use topup_engine::db_types::{Role, Roles};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub account_id: i64,
    pub roles: Roles,
}

impl JwtClaims {
    pub fn new(account_id: i64, roles: Roles) -> Self {
        Self { account_id, roles }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Claims are placed in the request extensions by [`crate::middleware::JwtMiddlewareFactory`].
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or(ServerError::AuthenticationError(AuthError::MissingToken)))
    }
}

/// Checks signatures and expiry on access tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    key: Hs256Key,
    time_options: TimeOptions,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self { key: config.key(), time_options: TimeOptions::default() }
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let untrusted = UntrustedToken::new(token).map_err(|e| AuthError::PoorlyFormattedToken(e.to_string()))?;
        let token = Hs256
            .validator::<JwtClaims>(&self.key)
            .validate(&untrusted)
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        token.claims().validate_expiration(&self.time_options).map_err(|e| AuthError::ValidationError(e.to_string()))?;
        let (_, claims) = token.into_parts();
        debug!("🔐️ Access token validated for account #{}", claims.custom.account_id);
        Ok(claims.custom)
    }
}

pub struct TokenIssuer {
    key: Hs256Key,
    time_options: TimeOptions,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { key: config.key(), time_options: TimeOptions::default() }
    }

    /// Issue a new access token for the given claims. Nothing about the claims is checked.
    pub fn issue_token(&self, claims: JwtClaims, duration: Option<Duration>) -> Result<String, AuthError> {
        let duration = duration.unwrap_or_else(|| Duration::hours(DEFAULT_TOKEN_LIFETIME_HOURS));
        let header = Header::empty().with_token_type("JWT");
        let claims = Claims::new(claims).set_duration_and_issuance(&self.time_options, duration);
        Hs256.token(&header, &claims, &self.key).map_err(|e| AuthError::ValidationError(e.to_string()))
    }
}
