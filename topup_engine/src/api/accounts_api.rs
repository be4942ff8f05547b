//! Unifies API for accessing accounts and their orders.

use std::fmt::Debug;

use log::trace;
use serde::{Deserialize, Serialize};
use topup_common::Money;

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{Account, Order, OrderId},
    traits::{AccountApiError, AccountManagement},
};

/// A list of orders along with their combined value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderResult {
    pub total_orders: Money,
    pub orders: Vec<Order>,
}

impl OrderResult {
    pub fn new(orders: Vec<Order>) -> Self {
        let total_orders = orders.iter().map(|o| o.amount).sum();
        Self { total_orders, orders }
    }
}

/// The `AccountApi` provides a unified API for accessing accounts.
pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Fetches the account for the given account id. If no account exists, `None` is returned.
    pub async fn account_by_id(&self, account_id: i64) -> Result<Option<Account>, AccountApiError> {
        self.db.fetch_account(account_id).await
    }

    pub async fn order_by_id(&self, order_id: OrderId) -> Result<Option<Order>, AccountApiError> {
        self.db.fetch_order_by_id(order_id).await
    }

    /// Fetches all orders for the account, newest first, and wraps them in an `OrderResult`.
    pub async fn orders_for_account(&self, account_id: i64) -> Result<OrderResult, AccountApiError> {
        let orders = self.db.fetch_orders_for_account(account_id).await?;
        trace!("{} orders for account #{account_id}", orders.len());
        Ok(OrderResult::new(orders))
    }

    pub async fn manual_orders_for_account(&self, account_id: i64) -> Result<OrderResult, AccountApiError> {
        let orders = self.db.fetch_manual_orders_for_account(account_id).await?;
        Ok(OrderResult::new(orders))
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, AccountApiError> {
        self.db.search_orders(query).await
    }
}
