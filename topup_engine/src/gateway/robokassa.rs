use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use md5::Md5;
use sha2::{Digest, Sha256};
use topup_common::{helpers::parse_boolean_flag, Money, Secret};
use url::Url;

use crate::{
    db_types::OrderId,
    gateway::{GatewayError, PaymentGateway},
};

pub const DEFAULT_ROBOKASSA_BASE_URL: &str = "https://auth.robokassa.ru/Merchant/Index.aspx";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_MERCHANT_LOGIN: &str = "demo";
const DEFAULT_PASSWORD_1: &str = "password_1";
const DEFAULT_PASSWORD_2: &str = "password_2";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 5000;

//--------------------------------------    HashAlgorithm    ---------------------------------------------------------
/// The digest RoboKassa uses for signatures. It is chosen per shop in the merchant console and must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Lowercase hex digest of `input`.
    pub fn hex_digest(&self, input: &str) -> String {
        match self {
            HashAlgorithm::Md5 => format!("{:x}", Md5::digest(input.as_bytes())),
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(input.as_bytes())),
        }
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            s => Err(GatewayError::Configuration(format!("Unsupported hash algorithm: {s}"))),
        }
    }
}

//--------------------------------------   RoboKassaConfig   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct RoboKassaConfig {
    pub merchant_login: String,
    /// Signs outgoing payment requests.
    pub password_1: Secret<String>,
    /// Verifies incoming result notifications.
    pub password_2: Secret<String>,
    /// Adds `IsTest=1` to payment URLs, which sends the customer to the sandbox.
    pub is_test: bool,
    pub hash_algorithm: HashAlgorithm,
    pub base_url: String,
    /// The storefront. Customers are sent back to `{frontend_url}/order/{id}` after paying.
    pub frontend_url: String,
    pub timeout: Duration,
}

impl Default for RoboKassaConfig {
    fn default() -> Self {
        Self {
            merchant_login: DEFAULT_MERCHANT_LOGIN.to_string(),
            password_1: Secret::new(DEFAULT_PASSWORD_1.to_string()),
            password_2: Secret::new(DEFAULT_PASSWORD_2.to_string()),
            is_test: true,
            hash_algorithm: HashAlgorithm::default(),
            base_url: DEFAULT_ROBOKASSA_BASE_URL.to_string(),
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_GATEWAY_TIMEOUT_MS),
        }
    }
}

impl RoboKassaConfig {
    pub fn new(merchant_login: &str, password_1: &str, password_2: &str) -> Self {
        Self {
            merchant_login: merchant_login.to_string(),
            password_1: Secret::new(password_1.to_string()),
            password_2: Secret::new(password_2.to_string()),
            ..Default::default()
        }
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_frontend_url(mut self, url: &str) -> Self {
        self.frontend_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    pub fn with_test_mode(mut self, is_test: bool) -> Self {
        self.is_test = is_test;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env_or_default() -> Self {
        let merchant_login = env::var("TOPUP_ROBOKASSA_MERCHANT_LOGIN").ok().unwrap_or_else(|| {
            warn!("🪛️ TOPUP_ROBOKASSA_MERCHANT_LOGIN is not set. Using the demo merchant '{DEFAULT_MERCHANT_LOGIN}'.");
            DEFAULT_MERCHANT_LOGIN.to_string()
        });
        let password_1 = env::var("TOPUP_ROBOKASSA_PASSWORD_1").ok().unwrap_or_else(|| {
            warn!(
                "🪛️ TOPUP_ROBOKASSA_PASSWORD_1 is not set. Payment URLs will be signed with the demo password and \
                 will be rejected by a live shop."
            );
            DEFAULT_PASSWORD_1.to_string()
        });
        let password_2 = env::var("TOPUP_ROBOKASSA_PASSWORD_2").ok().unwrap_or_else(|| {
            warn!(
                "🪛️ TOPUP_ROBOKASSA_PASSWORD_2 is not set. Result notifications will be checked against the demo \
                 password. Anyone who knows it can confirm payments. Do not run like this in production."
            );
            DEFAULT_PASSWORD_2.to_string()
        });
        let is_test = parse_boolean_flag(env::var("TOPUP_ROBOKASSA_IS_TEST").ok(), true);
        if is_test {
            info!("🪛️ RoboKassa is in test mode. Payment URLs will point at the sandbox.");
        }
        let hash_algorithm = env::var("TOPUP_ROBOKASSA_HASH_ALGORITHM")
            .ok()
            .map(|s| {
                s.parse::<HashAlgorithm>().unwrap_or_else(|e| {
                    error!("🪛️ {e}. Using {} instead.", HashAlgorithm::default());
                    HashAlgorithm::default()
                })
            })
            .unwrap_or_default();
        let base_url = env::var("TOPUP_ROBOKASSA_BASE_URL").ok().unwrap_or_else(|| DEFAULT_ROBOKASSA_BASE_URL.into());
        let frontend_url = env::var("TOPUP_FRONTEND_URL").ok().unwrap_or_else(|| {
            info!("🪛️ TOPUP_FRONTEND_URL is not set. Using the default, {DEFAULT_FRONTEND_URL}.");
            DEFAULT_FRONTEND_URL.to_string()
        });
        let timeout = env::var("TOPUP_GATEWAY_TIMEOUT_MS")
            .map(|s| {
                s.parse::<u64>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid value for TOPUP_GATEWAY_TIMEOUT_MS. {e} Using the default, \
                         {DEFAULT_GATEWAY_TIMEOUT_MS}ms, instead."
                    );
                    DEFAULT_GATEWAY_TIMEOUT_MS
                })
            })
            .ok()
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_MS);
        Self {
            merchant_login,
            password_1: Secret::new(password_1),
            password_2: Secret::new(password_2),
            is_test,
            hash_algorithm,
            base_url,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_millis(timeout),
        }
    }
}

//--------------------------------------   RoboKassaClient   ---------------------------------------------------------
/// Builds and checks RoboKassa signatures.
///
/// The two signatures are deliberately asymmetric, because that is what RoboKassa computes on its side:
/// * payment URLs are signed over `MerchantLogin:OutSum:InvId[:Receipt]:Password1`,
/// * result notifications are signed over `OutSum:InvId[:Receipt]:Password2`, without the merchant login.
#[derive(Debug, Clone)]
pub struct RoboKassaClient {
    config: RoboKassaConfig,
}

impl RoboKassaClient {
    pub fn new(config: RoboKassaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoboKassaConfig {
        &self.config
    }

    /// Where the customer lands after leaving the hosted page, whether the payment went through or not.
    pub fn order_page_url(&self, order_id: OrderId) -> String {
        format!("{}/order/{}", self.config.frontend_url, order_id.value())
    }

    pub fn sign_payment_request(&self, out_sum: &str, inv_id: &str, receipt: Option<&str>) -> String {
        let merchant = self.config.merchant_login.as_str();
        let password = self.config.password_1.reveal();
        let input = match receipt {
            Some(receipt) => format!("{merchant}:{out_sum}:{inv_id}:{receipt}:{password}"),
            None => format!("{merchant}:{out_sum}:{inv_id}:{password}"),
        };
        self.config.hash_algorithm.hex_digest(&input)
    }

    /// The signature RoboKassa puts on a result notification for these fields.
    pub fn sign_result(&self, out_sum: &str, inv_id: &str, receipt: Option<&str>) -> String {
        let password = self.config.password_2.reveal();
        let input = match receipt {
            Some(receipt) => format!("{out_sum}:{inv_id}:{receipt}:{password}"),
            None => format!("{out_sum}:{inv_id}:{password}"),
        };
        self.config.hash_algorithm.hex_digest(&input)
    }

    /// Builds the hosted page URL. Every query value is percent-encoded.
    pub fn build_payment_url(
        &self,
        order_id: OrderId,
        amount: Money,
        description: &str,
        receipt: Option<&str>,
    ) -> Result<String, GatewayError> {
        if !amount.is_positive() {
            return Err(GatewayError::Encoding(format!("Cannot request a payment of {amount}")));
        }
        let base = Url::parse(&self.config.base_url)
            .map_err(|e| GatewayError::Configuration(format!("Invalid base URL '{}': {e}", self.config.base_url)))?;
        let out_sum = amount.to_string();
        let inv_id = order_id.value().to_string();
        let signature = self.sign_payment_request(&out_sum, &inv_id, receipt);
        let return_url = self.order_page_url(order_id);

        let mut params = vec![
            ("MerchantLogin", self.config.merchant_login.as_str()),
            ("OutSum", out_sum.as_str()),
            ("InvId", inv_id.as_str()),
            ("Description", description),
            ("SignatureValue", signature.as_str()),
            ("Culture", "ru"),
        ];
        if self.config.is_test {
            params.push(("IsTest", "1"));
        }
        if let Some(receipt) = receipt {
            params.push(("Receipt", receipt));
        }
        params.push(("SuccessURL", return_url.as_str()));
        params.push(("FailURL", return_url.as_str()));

        let query =
            params.iter().map(|(k, v)| format!("{k}={}", urlencoding::encode(v))).collect::<Vec<String>>().join("&");
        let url = format!("{}?{query}", base.as_str().trim_end_matches('?'));
        debug!("🧾️ Payment URL created for order {order_id} ({amount})");
        Ok(url)
    }
}

impl PaymentGateway for RoboKassaClient {
    fn request_timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn create_payment_url(
        &self,
        order_id: OrderId,
        amount: Money,
        description: &str,
        receipt: Option<&str>,
    ) -> Result<String, GatewayError> {
        self.build_payment_url(order_id, amount, description, receipt)
    }

    fn verify_result_signature(&self, out_sum: &str, inv_id: &str, signature: &str, receipt: Option<&str>) -> bool {
        let expected = self.sign_result(out_sum, inv_id, receipt);
        let valid = expected.eq_ignore_ascii_case(signature.trim());
        if valid {
            trace!("🧾️ Result signature for InvId {inv_id} is valid");
        } else {
            warn!("🧾️ Result signature mismatch for InvId {inv_id}, OutSum {out_sum}. Received '{signature}'");
        }
        valid
    }
}
