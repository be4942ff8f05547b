//! `SqliteDatabase` is a concrete implementation of a top-up store backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;
use topup_common::Money;

use super::db::{accounts, catalog, db_url, new_pool, orders, referrals};
use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{
        Account,
        CatalogProduct,
        NewAccount,
        NewOrder,
        NewReferralEarning,
        Order,
        OrderId,
        OrderStatusType,
        ReferralEarning,
    },
    traits::{
        AccountApiError,
        AccountManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        ReferralManagement,
        MANUAL_GAME_NAME,
        MANUAL_PRODUCT_NAME,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let account = accounts::insert_account(account, &mut conn).await?;
        Ok(account)
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<CatalogProduct>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let product = catalog::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_or_create_manual_placeholder(&self) -> Result<CatalogProduct, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let game_id = catalog::fetch_or_create_game(MANUAL_GAME_NAME, false, &mut tx).await?;
        let product = catalog::fetch_or_create_product(game_id, MANUAL_PRODUCT_NAME, false, &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn upsert_catalog_product(
        &self,
        game_name: &str,
        product_name: &str,
    ) -> Result<CatalogProduct, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let game_id = catalog::fetch_or_create_game(game_name, true, &mut tx).await?;
        let product = catalog::fetch_or_create_product(game_id, product_name, true, &mut tx).await?;
        tx.commit().await?;
        Ok(product)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        Ok(order)
    }

    async fn set_payment_url(&self, order_id: OrderId, url: &str) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::set_payment_url(order_id, url, &mut conn).await?.ok_or(PaymentGatewayError::OrderNotFound(order_id))
    }

    async fn try_transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::compare_and_set_status(order_id, from, to, &mut conn).await?;
        Ok(order)
    }

    async fn confirm_gateway_payment(
        &self,
        order_id: OrderId,
        transaction_id: &str,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::mark_processing_with_transaction(order_id, transaction_id, &mut conn).await?;
        if order.is_some() {
            debug!("🗃️ Order {order_id} is now processing. Transaction id: {transaction_id}");
        }
        Ok(order)
    }

    /// Cancels the order and credits the refund in one transaction.
    ///
    /// The status update goes first. If it does not match (the order moved on, or never existed) the transaction is
    /// rolled back and nothing is credited. The balance credit is an in-place increment, so concurrent refunds to
    /// the same account can not lose updates.
    async fn cancel_with_refund(
        &self,
        order_id: OrderId,
        from: OrderStatusType,
        refund: Money,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::compare_and_set_status(order_id, from, OrderStatusType::Canceled, &mut tx).await? {
            Some(order) => order,
            None => {
                tx.rollback().await?;
                return Ok(None);
            },
        };
        if refund.is_positive() {
            let account_id = match order.account_id {
                Some(id) => id,
                None => {
                    tx.rollback().await?;
                    return Err(PaymentGatewayError::NoAccountToCredit(order_id));
                },
            };
            if !accounts::credit_balance(account_id, refund, &mut tx).await? {
                tx.rollback().await?;
                return Err(PaymentGatewayError::AccountNotFound(account_id));
            }
            debug!("🗃️ Order {order_id} canceled. {refund} refunded to account #{account_id}");
        } else {
            debug!("🗃️ Order {order_id} canceled without a refund");
        }
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_account(&self, account_id: i64) -> Result<Option<Account>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let account = accounts::account_by_id(account_id, &mut conn).await?;
        Ok(account)
    }

    async fn fetch_account_by_referral_code(&self, code: &str) -> Result<Option<Account>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let account = accounts::account_by_referral_code(code, &mut conn).await?;
        Ok(account)
    }

    async fn fetch_order_by_id(&self, order_id: OrderId) -> Result<Option<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, AccountApiError> {
        let query = OrderQueryFilter::default().with_account_id(account_id);
        self.search_orders(query).await
    }

    async fn fetch_manual_orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, AccountApiError> {
        let query = OrderQueryFilter::default().with_account_id(account_id).manual_only();
        self.search_orders(query).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }
}

impl ReferralManagement for SqliteDatabase {
    async fn fetch_referral_earning_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<ReferralEarning>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let earning = referrals::earning_for_order(order_id, &mut conn).await?;
        Ok(earning)
    }

    async fn insert_referral_earning(
        &self,
        earning: NewReferralEarning,
    ) -> Result<(ReferralEarning, bool), PaymentGatewayError> {
        let order_id = earning.order_id;
        let referrer_id = earning.referrer_id;
        let amount = earning.amount;
        let mut tx = self.pool.begin().await?;
        let inserted = match referrals::insert_earning(earning, &mut tx).await {
            Ok(earning) => earning,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tx.rollback().await?;
                debug!("🗃️ Order {order_id} already has a referral earning. Nothing to do.");
                let mut conn = self.pool.acquire().await?;
                let existing = referrals::earning_for_order(order_id, &mut conn)
                    .await?
                    .ok_or(PaymentGatewayError::OrderNotFound(order_id))?;
                return Ok((existing, false));
            },
            Err(e) => return Err(e.into()),
        };
        if !accounts::credit_referral_earning(referrer_id, amount, &mut tx).await? {
            tx.rollback().await?;
            return Err(PaymentGatewayError::AccountNotFound(referrer_id));
        }
        tx.commit().await?;
        debug!("🗃️ {amount} credited to referrer #{referrer_id} for order {order_id}");
        Ok((inserted, true))
    }

    async fn fetch_earnings_for_referrer(&self, referrer_id: i64) -> Result<Vec<ReferralEarning>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let earnings = referrals::earnings_for_referrer(referrer_id, &mut conn).await?;
        Ok(earnings)
    }

    async fn fetch_referral_orders(&self, referrer_id: i64) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let orders = referrals::orders_paid_out_to(referrer_id, &mut conn).await?;
        Ok(orders)
    }

    async fn assign_referral_code(&self, account_id: i64, code: &str) -> Result<Account, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if accounts::set_referral_code_if_empty(account_id, code, &mut tx).await? {
            trace!("🗃️ Referral code {code} assigned to account #{account_id}");
        }
        let account =
            accounts::account_by_id(account_id, &mut tx).await?.ok_or(PaymentGatewayError::AccountNotFound(account_id))?;
        tx.commit().await?;
        Ok(account)
    }

    async fn link_referrer(&self, account_id: i64, referrer_id: i64) -> Result<bool, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if !accounts::set_referrer_if_empty(account_id, referrer_id, &mut tx).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        accounts::incr_total_referrals(referrer_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Account #{account_id} is now referred by #{referrer_id}");
        Ok(true)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Migrations are embedded in the binary.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
