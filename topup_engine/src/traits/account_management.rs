use thiserror::Error;

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{Account, Order, OrderId},
};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}

/// The `AccountManagement` trait defines the read side of the store: accounts and the orders attached to them.
///
/// Nothing in this trait changes state. Balance changes and order transitions live in
/// [`crate::PaymentGatewayDatabase`] and [`crate::ReferralManagement`], where they can be made atomic.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    /// Fetches the account with the given id. If no account exists, `None` is returned.
    async fn fetch_account(&self, account_id: i64) -> Result<Option<Account>, AccountApiError>;

    async fn fetch_account_by_referral_code(&self, code: &str) -> Result<Option<Account>, AccountApiError>;

    async fn fetch_order_by_id(&self, order_id: OrderId) -> Result<Option<Order>, AccountApiError>;

    /// All orders placed by the account, newest first.
    async fn fetch_orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, AccountApiError>;

    /// Orders placed by the account for titles that are not in the catalog, newest first.
    async fn fetch_manual_orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, AccountApiError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, AccountApiError>;
}
