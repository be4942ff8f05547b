use crate::{
    db_types::{Account, NewReferralEarning, Order, OrderId, ReferralEarning},
    traits::PaymentGatewayError,
};

/// Storage for referral links and the payouts they generate.
#[allow(async_fn_in_trait)]
pub trait ReferralManagement {
    async fn fetch_referral_earning_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Option<ReferralEarning>, PaymentGatewayError>;

    /// Records the earning and credits the referrer's balance and earnings total in a single transaction.
    ///
    /// At most one earning can exist per order. If one already does, nothing is credited and the existing row is
    /// returned with `false` in the second position.
    async fn insert_referral_earning(
        &self,
        earning: NewReferralEarning,
    ) -> Result<(ReferralEarning, bool), PaymentGatewayError>;

    /// All payouts made to the given referrer, newest first.
    async fn fetch_earnings_for_referrer(&self, referrer_id: i64) -> Result<Vec<ReferralEarning>, PaymentGatewayError>;

    /// The orders placed by referred customers that paid out to the given referrer, most recent payout first.
    async fn fetch_referral_orders(&self, referrer_id: i64) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Sets the account's referral code if it does not have one yet, and returns the account as stored. An existing
    /// code is never replaced.
    async fn assign_referral_code(&self, account_id: i64, code: &str) -> Result<Account, PaymentGatewayError>;

    /// Links `account_id` to `referrer_id` and bumps the referrer's referral count, atomically.
    ///
    /// Returns `false` if the account was already linked to a referrer, in which case nothing changes.
    async fn link_referrer(&self, account_id: i64, referrer_id: i64) -> Result<bool, PaymentGatewayError>;
}
