//! # Top-up engine public API
//!
//! The API is modular, so that clients can pick the parts they need.
//!
//! * [`order_flow_api`] creates orders (for signed-in customers, for guests, in bulk and for titles outside the
//!   catalog) and moves them through their life cycle, including cancellations and refunds.
//! * [`webhook_api`] reconciles payment result notifications from the hosted payment gateway.
//! * [`referral_api`] pays referrers and manages referral codes.
//! * [`accounts_api`] answers read-only queries about accounts and their orders.
//!
//! # API usage
//!
//! Every API is created by supplying a database backend that implements the backend traits it needs.
//!
//! ```rust,ignore
//! use topup_engine::{AccountApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/topup_store.db", 5).await?;
//! let api = AccountApi::new(db);
//! let orders = api.orders_for_account(1).await?;
//! ```
pub mod accounts_api;
pub mod errors;
pub mod order_flow_api;
pub mod order_objects;
pub mod referral_api;
pub mod webhook_api;
