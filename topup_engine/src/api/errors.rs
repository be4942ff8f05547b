use thiserror::Error;
use topup_common::MoneyConversionError;

use crate::{
    db_types::{OrderId, OrderStatusType},
    gateway::GatewayError,
    traits::{AccountApiError, PaymentGatewayError},
};

/// The broad class an [`OrderFlowError`] belongs to. Transport layers map these onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    NotFound,
    StateConflict,
    Gateway,
    Internal,
}

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("The payment notification signature is invalid")]
    InvalidSignature,
    #[error("Not allowed: {0}")]
    Unauthorized(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Account {0} does not exist")]
    AccountNotFound(i64),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Order {0} is a guest order and has no account to credit")]
    GuestOrder(OrderId),
    #[error("Referral code {0} does not exist")]
    ReferralCodeNotFound(String),
    #[error("Cannot {action} order {order_id} while it is {status}")]
    StateConflict { order_id: OrderId, status: OrderStatusType, action: String },
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderFlowError {
    pub fn state_conflict<S: Into<String>>(order_id: OrderId, status: OrderStatusType, action: S) -> Self {
        Self::StateConflict { order_id, status, action: action.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidSignature | Self::Unauthorized(_) => ErrorKind::Auth,
            Self::OrderNotFound(_) |
            Self::AccountNotFound(_) |
            Self::ProductNotFound(_) |
            Self::GuestOrder(_) |
            Self::ReferralCodeNotFound(_) => ErrorKind::NotFound,
            Self::StateConflict { .. } => ErrorKind::StateConflict,
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::DatabaseError(_) => ErrorKind::Internal,
        }
    }
}

impl From<PaymentGatewayError> for OrderFlowError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderNotFound(id) => Self::OrderNotFound(id),
            PaymentGatewayError::AccountNotFound(id) => Self::AccountNotFound(id),
            PaymentGatewayError::ProductNotFound(id) => Self::ProductNotFound(id),
            PaymentGatewayError::NoAccountToCredit(id) => Self::GuestOrder(id),
            PaymentGatewayError::AccountError(e) => e.into(),
            PaymentGatewayError::DatabaseError(s) => Self::DatabaseError(s),
        }
    }
}

impl From<AccountApiError> for OrderFlowError {
    fn from(e: AccountApiError) -> Self {
        match e {
            AccountApiError::DatabaseError(s) => Self::DatabaseError(s),
            AccountApiError::QueryError(s) => Self::Validation(s),
        }
    }
}

impl From<MoneyConversionError> for OrderFlowError {
    fn from(e: MoneyConversionError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
