//! Top-up Store Engine
//!
//! The engine holds the core logic of the top-up storefront: orders, the payments that settle them and the referral
//! payouts they earn. It knows nothing about HTTP; the server crate puts a web surface on top of it.
//!
//! The library is divided into these main sections:
//! 1. The data types shared by every layer ([`mod@db_types`]).
//! 2. The backend contracts ([`mod@traits`]) and their SQLite implementation ([`SqliteDatabase`]). You should never
//!    need to access the database directly. Instead, use the public API provided by the engine.
//! 3. The public API ([`mod@api`]). [`OrderFlowApi`] creates orders and moves them through their life cycle,
//!    [`WebhookApi`] reconciles gateway payment notifications, [`ReferralApi`] pays referrers and [`AccountApi`]
//!    answers read-only queries.
//! 4. The hosted payment page integration ([`mod@gateway`]).
//!
//! The engine also publishes events when orders are created, paid, canceled or completed. Subscribe to them with
//! [`events::EventHooks`] to send notifications without holding up the order flows.
pub mod api;
pub mod db_types;
pub mod events;
pub mod gateway;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    accounts_api::{AccountApi, OrderResult},
    errors::{ErrorKind, OrderFlowError},
    order_flow_api::OrderFlowApi,
    order_objects,
    referral_api::{ReferralApi, ReferralCodeOwner, ReferralOrderSummary, ReferralPolicy, ReferralStats},
    webhook_api::{WebhookApi, WebhookOutcome},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{AccountApiError, AccountManagement, PaymentGatewayDatabase, PaymentGatewayError, ReferralManagement};
