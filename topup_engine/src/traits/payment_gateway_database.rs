use thiserror::Error;
use topup_common::Money;

use crate::{
    db_types::{Account, CatalogProduct, NewAccount, NewOrder, Order, OrderId, OrderStatusType},
    traits::{AccountApiError, AccountManagement},
};

pub const MANUAL_GAME_NAME: &str = "Manual Orders";
pub const MANUAL_PRODUCT_NAME: &str = "Manual Order Service";

/// This trait defines the highest level of behaviour for backends supporting the top-up store.
///
/// This behaviour includes:
/// * Persisting new orders and the catalog references they point at.
/// * Order status transitions, each of which is a compare-and-swap on the current status.
/// * Cancellations and refunds, which move money and change status in a single transaction.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + AccountManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates a new account. Registration lives outside the store, so this is used by the registration
    /// collaborator and by tests.
    async fn create_account(&self, account: NewAccount) -> Result<Account, PaymentGatewayError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<CatalogProduct>, PaymentGatewayError>;

    /// Returns the placeholder product used by orders for titles that are not in the catalog. The placeholder game
    /// ([`MANUAL_GAME_NAME`]) and product ([`MANUAL_PRODUCT_NAME`]) are created, disabled, on first use and reused
    /// thereafter.
    async fn fetch_or_create_manual_placeholder(&self) -> Result<CatalogProduct, PaymentGatewayError>;

    /// Makes sure the catalog holds the given game and product, and returns the product. The catalog itself is
    /// managed elsewhere; this keeps the projection that orders point at in step with it.
    async fn upsert_catalog_product(
        &self,
        game_name: &str,
        product_name: &str,
    ) -> Result<CatalogProduct, PaymentGatewayError>;

    /// Stores a new order. Every new order has `pending` status.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Records the hosted payment page URL for the order, replacing any previous one.
    async fn set_payment_url(&self, order_id: OrderId, url: &str) -> Result<Order, PaymentGatewayError>;

    /// Moves the order from `from` to `to`, but only if its status is still `from`.
    ///
    /// Returns `None` if the order does not exist or its status has already moved on. The caller decides which of the
    /// two it was.
    async fn try_transition_status(
        &self,
        order_id: OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// Moves a `pending` order to `processing` and stamps it with the gateway transaction id.
    ///
    /// Returns `None` if the order was no longer pending (typically because a concurrent delivery of the same
    /// notification got there first). The transaction id is only ever written by this call.
    async fn confirm_gateway_payment(
        &self,
        order_id: OrderId,
        transaction_id: &str,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// Cancels the order and credits `refund` to the owning account in one transaction.
    ///
    /// The order must currently have status `from`, otherwise nothing changes and `None` is returned. A non-zero
    /// refund on a guest order is rejected with [`PaymentGatewayError::NoAccountToCredit`].
    async fn cancel_with_refund(
        &self,
        order_id: OrderId,
        from: OrderStatusType,
        refund: Money,
    ) -> Result<Option<Order>, PaymentGatewayError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("{0}")]
    AccountError(#[from] AccountApiError),
    #[error("The requested account id {0} does not exist")]
    AccountNotFound(i64),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Order {0} has no account that could be credited")]
    NoAccountToCredit(OrderId),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
