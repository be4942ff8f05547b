use serde::{Deserialize, Serialize};
use topup_common::Money;

use crate::db_types::{Order, ReferralEarning};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order for a title that is not in the catalog. An operator has to pick it up by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualOrderCreatedEvent {
    pub order: Order,
}

impl ManualOrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// How an order came to be paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// A signed result notification from the payment gateway.
    Gateway,
    /// A trusted internal caller (an admin, or an order created already paid).
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub source: PaymentSource,
    /// The payer's email, if the gateway reported one.
    pub payer_email: Option<String>,
    pub referral: Option<ReferralEarning>,
}

impl OrderPaidEvent {
    pub fn new(order: Order, source: PaymentSource) -> Self {
        Self { order, source, payer_email: None, referral: None }
    }

    pub fn with_payer_email(mut self, email: Option<String>) -> Self {
        self.payer_email = email;
        self
    }

    pub fn with_referral(mut self, referral: Option<ReferralEarning>) -> Self {
        self.referral = referral;
        self
    }
}

/// The order was canceled. `refunded` is what went back to the customer's balance, and may be zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub refunded: Money,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order, refunded: Money) -> Self {
        Self { order, refunded }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
}

impl OrderCompletedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralPaidEvent {
    pub earning: ReferralEarning,
    pub order: Order,
}

impl ReferralPaidEvent {
    pub fn new(earning: ReferralEarning, order: Order) -> Self {
        Self { earning, order }
    }
}
