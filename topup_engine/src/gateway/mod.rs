//! # Hosted payment page integration
//!
//! A payment gateway collects money on its own hosted page and reports the result back to us with a signed callback.
//! [`PaymentGateway`] is the seam the order flows use: one call to build a signed redirect URL, one to check the
//! signature on an incoming result notification.
//!
//! [`RoboKassaClient`] is the production implementation. [`WebhookPayload`] turns the raw callback body into the
//! fields the signature covers.
pub(crate) mod robokassa;
mod webhook;

use std::time::Duration;

pub use robokassa::{HashAlgorithm, RoboKassaClient, RoboKassaConfig};
use thiserror::Error;
use topup_common::Money;
pub use webhook::WebhookPayload;

use crate::db_types::OrderId;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Payment gateway is misconfigured: {0}")]
    Configuration(String),
    #[error("The payment gateway did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Could not encode the payment request: {0}")]
    Encoding(String),
}

#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// How long order flows wait for [`Self::create_payment_url`] before giving up.
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// Builds the URL of the hosted payment page for this order.
    ///
    /// `receipt` is the fiscal receipt blob, passed through verbatim. It is covered by the signature when present.
    async fn create_payment_url(
        &self,
        order_id: OrderId,
        amount: Money,
        description: &str,
        receipt: Option<&str>,
    ) -> Result<String, GatewayError>;

    /// Checks the signature on a payment result notification. The fields must be exactly as received; in
    /// particular, `out_sum` must not be re-formatted.
    ///
    /// A mismatch returns `false`. It is never an error.
    fn verify_result_signature(&self, out_sum: &str, inv_id: &str, signature: &str, receipt: Option<&str>) -> bool;
}
