use std::{fmt::Debug, str::FromStr};

use log::*;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    api::{errors::OrderFlowError, referral_api::ReferralApi},
    db_types::{Order, OrderId, OrderStatusType},
    events::{EventProducers, OrderPaidEvent, PaymentSource},
    gateway::{PaymentGateway, WebhookPayload},
    traits::{PaymentGatewayDatabase, ReferralManagement},
};

/// What happened to a correctly signed payment notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "order", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// This delivery confirmed the payment.
    Processed(Order),
    /// The payment had already been confirmed, by an earlier delivery or some other route.
    AlreadyProcessed(Order),
}

impl WebhookOutcome {
    pub fn order(&self) -> &Order {
        match self {
            Self::Processed(order) | Self::AlreadyProcessed(order) => order,
        }
    }

    /// The body the gateway expects in reply. Anything else makes it deliver the notification again.
    pub fn acknowledgement(&self) -> String {
        acknowledgement(self.order().id)
    }
}

pub fn acknowledgement(order_id: OrderId) -> String {
    format!("OK{}", order_id.value())
}

pub fn transaction_id(inv_id: &str, out_sum: &str) -> String {
    format!("robokassa_{inv_id}_{out_sum}")
}

/// Reconciles payment result notifications from the hosted payment gateway against orders.
///
/// Gateways deliver notifications at least once, so [`WebhookApi::process_payment_result`] is idempotent: only the
/// first delivery for an order changes anything, and every later delivery is acknowledged as already processed.
pub struct WebhookApi<B, G> {
    db: B,
    gateway: G,
    referrals: ReferralApi<B>,
    producers: EventProducers,
}

impl<B, G> Debug for WebhookApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookApi")
    }
}

impl<B: Clone, G: Clone> Clone for WebhookApi<B, G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            referrals: self.referrals.clone(),
            producers: self.producers.clone(),
        }
    }
}

impl<B, G> WebhookApi<B, G> {
    pub fn new(db: B, gateway: G, referrals: ReferralApi<B>, producers: EventProducers) -> Self {
        Self { db, gateway, referrals, producers }
    }
}

impl<B, G> WebhookApi<B, G>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    pub async fn process_payment_result(&self, payload: WebhookPayload) -> Result<WebhookOutcome, OrderFlowError> {
        let receipt = payload.receipt.as_deref();
        if !self.gateway.verify_result_signature(&payload.out_sum, &payload.inv_id, &payload.signature, receipt) {
            error!(
                "🧾️ REJECTED a payment notification for InvId {} ({}) with an invalid signature. If this keeps \
                 happening, someone may be probing the result endpoint, or password #2 is misconfigured.",
                payload.inv_id, payload.out_sum
            );
            return Err(OrderFlowError::InvalidSignature);
        }
        let order_id = payload
            .inv_id
            .parse::<OrderId>()
            .map_err(|_| OrderFlowError::Validation(format!("InvId {} is not an order id", payload.inv_id)))?;
        let order = self.db.fetch_order_by_id(order_id).await?.ok_or_else(|| {
            warn!("🧾️ Payment notification for order {order_id}, which does not exist");
            OrderFlowError::OrderNotFound(order_id)
        })?;
        if order.status != OrderStatusType::Pending {
            info!("🧾️ Order {order_id} is already {}. Acknowledging the repeat notification.", order.status);
            return Ok(WebhookOutcome::AlreadyProcessed(order));
        }
        let paid = Decimal::from_str(payload.out_sum.trim())
            .map_err(|_| OrderFlowError::Validation(format!("OutSum {} is not an amount", payload.out_sum)))?;
        if paid != order.amount.to_decimal() {
            error!(
                "🧾️ Payment notification for order {order_id} reports {paid}, but the order is for {}. The order has \
                 NOT been marked as paid.",
                order.amount
            );
            return Err(OrderFlowError::Validation("Payment amount does not match the order".to_string()));
        }
        let txid = transaction_id(&payload.inv_id, &payload.out_sum);
        let order = match self.db.confirm_gateway_payment(order_id, &txid).await? {
            Some(order) => order,
            None => {
                info!("🧾️ A concurrent notification for order {order_id} confirmed it first");
                let order = self.db.fetch_order_by_id(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))?;
                return Ok(WebhookOutcome::AlreadyProcessed(order));
            },
        };
        info!("🧾️ Payment for order {order_id} confirmed. [{txid}]");
        let referral = match self.referrals.process_referral_earning(&order).await {
            Ok(r) => r,
            Err(e) => {
                error!("🧾️ Referral payout for order {order_id} failed. The payment is still confirmed. {e}");
                None
            },
        };
        for producer in &self.producers.order_paid_producer {
            let event = OrderPaidEvent::new(order.clone(), PaymentSource::Gateway)
                .with_payer_email(payload.email.clone())
                .with_referral(referral.clone());
            producer.publish_event(event);
        }
        Ok(WebhookOutcome::Processed(order))
    }
}
