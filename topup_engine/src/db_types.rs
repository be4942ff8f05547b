use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row, Type};
use thiserror::Error;
pub use topup_common::Money;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

//--------------------------------------        Role         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

pub type Roles = Vec<Role>;

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------       OrderId       ---------------------------------------------------------
/// The order id. It is also the invoice number (`InvId`) that the payment gateway echoes back in its callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub i64);

impl OrderId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for OrderId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self).map_err(|e| ConversionError(format!("Invalid order id '{s}': {e}")))
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------   OrderStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusType {
    /// Newly created, awaiting payment.
    Pending,
    /// Payment was confirmed by a trusted internal caller (admin or automatic method).
    Paid,
    /// The payment gateway confirmed payment; fulfilment is under way.
    Processing,
    /// Fulfilled. Terminal.
    Done,
    /// Cancelled or refunded. Terminal.
    Canceled,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 5] = [Self::Pending, Self::Paid, Self::Processing, Self::Done, Self::Canceled];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    /// True for every state that can only be reached once money has been received.
    pub fn is_payment_confirmed(&self) -> bool {
        matches!(self, Self::Paid | Self::Processing | Self::Done)
    }

    /// The order state machine.
    ///
    /// | From \ To  | Paid | Processing | Done | Canceled |
    /// |------------|------|------------|------|----------|
    /// | Pending    | ✔    | ✔          |      | ✔        |
    /// | Paid       |      | ✔          | ✔    | ✔        |
    /// | Processing |      |            | ✔    | ✔        |
    /// | Done       |      |            |      |          |
    /// | Canceled   |      |            |      |          |
    ///
    /// Nothing transitions back to `Pending`, and a transition to the current status is not a transition.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (Pending, Paid | Processing | Canceled) | (Paid, Processing | Done | Canceled) | (Processing, Done | Canceled)
        )
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "pending"),
            OrderStatusType::Paid => write!(f, "paid"),
            OrderStatusType::Processing => write!(f, "processing"),
            OrderStatusType::Done => write!(f, "done"),
            OrderStatusType::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMethod    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Settled internally without a redirect (e.g. from the account balance).
    Auto,
    /// Handled by an operator.
    Manual,
    /// Bank card via RoboKassa.
    Sberbank,
    /// Faster Payments System via RoboKassa.
    Sbp,
    Ton,
    Usdt,
    Unitpay,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 7] =
        [Self::Auto, Self::Manual, Self::Sberbank, Self::Sbp, Self::Ton, Self::Usdt, Self::Unitpay];

    /// Whether paying with this method means redirecting the customer to the hosted gateway page.
    pub fn uses_hosted_gateway(&self) -> bool {
        match self {
            PaymentMethod::Sberbank | PaymentMethod::Sbp => true,
            PaymentMethod::Auto |
            PaymentMethod::Manual |
            PaymentMethod::Ton |
            PaymentMethod::Usdt |
            PaymentMethod::Unitpay => false,
        }
    }

    pub fn hosted_gateway_methods() -> Vec<PaymentMethod> {
        Self::ALL.into_iter().filter(|m| m.uses_hosted_gateway()).collect()
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentMethod::Auto => "auto",
            PaymentMethod::Manual => "manual",
            PaymentMethod::Sberbank => "sberbank",
            PaymentMethod::Sbp => "sbp",
            PaymentMethod::Ton => "ton",
            PaymentMethod::Usdt => "usdt",
            PaymentMethod::Unitpay => "unitpay",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConversionError(format!("Invalid payment method: {s}")))
    }
}

//--------------------------------------   OrderAttachment   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The answers a customer filled into a product's input form (player id, server, nickname and so on).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAnswers {
    pub product_id: i64,
    pub answers: BTreeMap<String, String>,
}

/// Structured data submitted alongside an order. Stored as JSON in the `attachment` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderAttachment {
    GuestContact { contact: GuestContact },
    FormAnswers { lines: Vec<LineAnswers> },
    Both { contact: GuestContact, lines: Vec<LineAnswers> },
}

impl OrderAttachment {
    /// Picks the variant that fits the data. Lines without any answers are dropped; `None` means there is nothing
    /// to attach.
    pub fn build(contact: Option<GuestContact>, lines: Vec<LineAnswers>) -> Option<Self> {
        let lines = lines.into_iter().filter(|l| !l.answers.is_empty()).collect::<Vec<_>>();
        match (contact, lines.is_empty()) {
            (None, true) => None,
            (None, false) => Some(Self::FormAnswers { lines }),
            (Some(contact), true) => Some(Self::GuestContact { contact }),
            (Some(contact), false) => Some(Self::Both { contact, lines }),
        }
    }

    pub fn contact(&self) -> Option<&GuestContact> {
        match self {
            Self::GuestContact { contact } | Self::Both { contact, .. } => Some(contact),
            Self::FormAnswers { .. } => None,
        }
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.contact().map(|c| c.email.as_str())
    }

    pub fn lines(&self) -> &[LineAnswers] {
        match self {
            Self::FormAnswers { lines } | Self::Both { lines, .. } => lines,
            Self::GuestContact { .. } => &[],
        }
    }
}

//--------------------------------------       Account       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub balance: Money,
    pub referral_code: Option<String>,
    pub referred_by: Option<i64>,
    pub referral_earnings: Money,
    pub total_referrals: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl NewAccount {
    pub fn new<S: Into<String>>(username: S) -> Self {
        Self { username: Some(username.into()), email: None }
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: Option<i64>,
    pub game_id: i64,
    pub product_id: i64,
    pub manual_game_name: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub payment_url: Option<String>,
    pub comment: Option<String>,
    pub attachment: Option<OrderAttachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_guest_order(&self) -> bool {
        self.account_id.is_none()
    }

    pub fn is_owned_by(&self, account_id: i64) -> bool {
        self.account_id == Some(account_id)
    }
}

fn decode_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

impl<'r> FromRow<'r, SqliteRow> for Order {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status = row.try_get::<String, _>("status")?.parse::<OrderStatusType>().map_err(decode_err)?;
        let payment_method =
            row.try_get::<String, _>("payment_method")?.parse::<PaymentMethod>().map_err(decode_err)?;
        let attachment = match row.try_get::<Option<String>, _>("attachment")? {
            Some(json) => Some(serde_json::from_str::<OrderAttachment>(&json).map_err(decode_err)?),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            game_id: row.try_get("game_id")?,
            product_id: row.try_get("product_id")?,
            manual_game_name: row.try_get("manual_game_name")?,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            status,
            payment_method,
            transaction_id: row.try_get("transaction_id")?,
            payment_url: row.try_get("payment_url")?,
            comment: row.try_get("comment")?,
            attachment,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
/// A validated order, ready to be persisted. Every order starts life as `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub account_id: Option<i64>,
    pub game_id: i64,
    pub product_id: i64,
    pub manual_game_name: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub comment: Option<String>,
    pub attachment: Option<OrderAttachment>,
}

impl NewOrder {
    pub fn new(game_id: i64, product_id: i64, amount: Money, currency: &str, payment_method: PaymentMethod) -> Self {
        Self {
            account_id: None,
            game_id,
            product_id,
            manual_game_name: None,
            amount,
            currency: currency.to_string(),
            payment_method,
            comment: None,
            attachment: None,
        }
    }

    pub fn for_account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_manual_game_name<S: Into<String>>(mut self, name: S) -> Self {
        self.manual_game_name = Some(name.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Option<OrderAttachment>) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn attachment_json(&self) -> Option<String> {
        self.attachment.as_ref().and_then(|a| {
            serde_json::to_string(a)
                .map_err(|e| error!("Could not serialize order attachment. It will not be saved. {e}"))
                .ok()
        })
    }
}

//--------------------------------------   ReferralEarning   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralEarning {
    pub id: i64,
    pub referrer_id: i64,
    pub referred_account_id: i64,
    pub order_id: OrderId,
    pub amount: Money,
    /// The percentage in force when the payout was made.
    pub percentage: Decimal,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for ReferralEarning {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let percentage = row.try_get::<String, _>("percentage")?.parse::<Decimal>().map_err(decode_err)?;
        Ok(Self {
            id: row.try_get("id")?,
            referrer_id: row.try_get("referrer_id")?,
            referred_account_id: row.try_get("referred_account_id")?,
            order_id: row.try_get("order_id")?,
            amount: row.try_get("amount")?,
            percentage,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReferralEarning {
    pub referrer_id: i64,
    pub referred_account_id: i64,
    pub order_id: OrderId,
    pub amount: Money,
    pub percentage: Decimal,
}

//--------------------------------------   CatalogProduct    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: i64,
    pub game_id: i64,
    pub name: String,
    pub enabled: bool,
}
