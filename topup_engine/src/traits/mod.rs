//! # Backend contracts
//!
//! This module defines the behaviour that a database backend needs to expose in order to power the store.
//!
//! * [`PaymentGatewayDatabase`] is the highest level of behaviour: persisting orders, status transitions and the
//!   refund operations that move money.
//! * [`AccountManagement`] provides read-only queries for accounts and orders.
//! * [`ReferralManagement`] stores referral links and payouts.
//!
//! Every status change is expressed as a compare-and-swap on the current status, and every balance change is
//! an in-database increment made in the same transaction as the record that justifies it. Backends must keep both
//! properties, since the APIs rely on them for exactly-once behaviour under concurrent requests.
mod account_management;
mod payment_gateway_database;
mod referral_management;

pub use account_management::{AccountApiError, AccountManagement};
pub use payment_gateway_database::{
    PaymentGatewayDatabase,
    PaymentGatewayError,
    MANUAL_GAME_NAME,
    MANUAL_PRODUCT_NAME,
};
pub use referral_management::ReferralManagement;
