use std::{collections::BTreeMap, fmt::Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topup_common::{Money, DEFAULT_CURRENCY_CODE};

use crate::{
    db_types::{Order, OrderStatusType, PaymentMethod, ReferralEarning},
    traits::AccountApiError,
};

//--------------------------------------   OrderQueryFilter  ---------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub account_id: Option<i64>,
    pub currency: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    /// `Some(true)` only returns manual orders, `Some(false)` only catalog orders.
    pub manual: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn since<T>(mut self, since: T) -> Result<Self, AccountApiError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = since.try_into().map_err(|e| AccountApiError::QueryError(e.to_string()))?;
        self.since = Some(dt);
        Ok(self)
    }

    pub fn until<T>(mut self, until: T) -> Result<Self, AccountApiError>
    where
        T: TryInto<DateTime<Utc>>,
        T::Error: Display,
    {
        let dt = until.try_into().map_err(|e| AccountApiError::QueryError(e.to_string()))?;
        self.until = Some(dt);
        Ok(self)
    }

    pub fn with_account_id(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_currency<S: Into<String>>(mut self, currency: S) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn manual_only(mut self) -> Self {
        self.manual = Some(true);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.account_id.is_none() &&
            self.currency.is_none() &&
            self.payment_method.is_none() &&
            self.manual.is_none() &&
            self.status.as_ref().map_or(true, |s| s.is_empty()) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(account_id) = &self.account_id {
            write!(f, "account_id: {account_id}. ")?;
        }
        if let Some(currency) = &self.currency {
            write!(f, "currency: {currency}. ")?;
        }
        if let Some(method) = &self.payment_method {
            write!(f, "payment_method: {method}. ")?;
        }
        if let Some(manual) = &self.manual {
            write!(f, "manual: {manual}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

//--------------------------------------   Order requests    ---------------------------------------------------------
fn default_currency() -> String {
    DEFAULT_CURRENCY_CODE.to_string()
}

/// Whether the caller may assert facts about payment that the store cannot check itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// An administrator or an internal service.
    Trusted,
    /// A customer.
    Untrusted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub game_id: i64,
    pub product_id: i64,
    pub amount: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// Asks for the order to be recorded as already paid. Only honoured for trusted callers using
    /// [`PaymentMethod::Auto`].
    #[serde(default)]
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualOrderRequest {
    pub manual_game_name: String,
    #[serde(default)]
    pub game_id: Option<i64>,
    #[serde(default)]
    pub product_id: Option<i64>,
    pub amount: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOrderLine {
    pub game_id: i64,
    pub product_id: i64,
    pub amount: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

impl BulkOrderLine {
    pub fn new(game_id: i64, product_id: i64, amount: Money, payment_method: PaymentMethod) -> Self {
        Self {
            game_id,
            product_id,
            amount,
            currency: default_currency(),
            payment_method,
            comment: None,
            answers: BTreeMap::new(),
        }
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_answer<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.answers.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkOrderRequest {
    pub items: Vec<BulkOrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestBulkOrderRequest {
    pub items: Vec<BulkOrderLine>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

//--------------------------------------    NewOrderResult   ---------------------------------------------------------
/// What every order creation flow hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderResult {
    pub order: Order,
    pub payment_url: Option<String>,
    /// The referral payout made when a trusted caller created the order already paid.
    pub referral: Option<ReferralEarning>,
    /// Problems that did not stop the order from being created, such as the payment gateway being unreachable.
    pub warnings: Vec<String>,
}

impl NewOrderResult {
    pub fn new(order: Order) -> Self {
        let payment_url = order.payment_url.clone();
        Self { order, payment_url, referral: None, warnings: Vec::new() }
    }

    pub fn with_warning<S: Into<String>>(mut self, warning: S) -> Self {
        self.warnings.push(warning.into());
        self
    }
}
