use std::{env, fmt::Debug, str::FromStr};

use log::*;
use rand::{distributions::Uniform, Rng};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topup_common::Money;

use crate::{
    api::errors::OrderFlowError,
    db_types::{Account, NewReferralEarning, Order, OrderId, ReferralEarning},
    events::{EventProducers, ReferralPaidEvent},
    gateway::robokassa::DEFAULT_FRONTEND_URL,
    traits::{PaymentGatewayDatabase, ReferralManagement},
};

pub const REFERRAL_PERCENTAGE_ENV: &str = "TOPUP_REFERRAL_PERCENTAGE";
pub const REFERRAL_CODE_PREFIX: &str = "REF";
const REFERRAL_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERRAL_CODE_LENGTH: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 5;
/// How many of the latest referral orders [`ReferralStats`] lists.
pub const RECENT_REFERRAL_ORDERS: usize = 10;

/// Where the referral percentage comes from.
#[derive(Debug, Clone, Default)]
pub enum ReferralPolicy {
    /// Read [`REFERRAL_PERCENTAGE_ENV`] on every payout, so the rate can change without a restart.
    #[default]
    FromEnv,
    Fixed(Decimal),
}

impl ReferralPolicy {
    pub fn default_percentage() -> Decimal {
        Decimal::ONE
    }

    pub fn percentage(&self) -> Decimal {
        match self {
            ReferralPolicy::Fixed(pct) => *pct,
            ReferralPolicy::FromEnv => match env::var(REFERRAL_PERCENTAGE_ENV) {
                Ok(s) => parse_percentage(&s).unwrap_or_else(|| {
                    warn!(
                        "💸️ {s} is not a valid referral percentage. Using the default of {}%.",
                        Self::default_percentage()
                    );
                    Self::default_percentage()
                }),
                Err(_) => Self::default_percentage(),
            },
        }
    }
}

fn parse_percentage(s: &str) -> Option<Decimal> {
    Decimal::from_str(s.trim()).ok().filter(|d| !d.is_sign_negative())
}

/// `REF` followed by eight random upper-case letters and digits.
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    let dist = Uniform::from(0..REFERRAL_CODE_CHARS.len());
    let suffix = (0..REFERRAL_CODE_LENGTH).map(|_| REFERRAL_CODE_CHARS[rng.sample(dist)] as char).collect::<String>();
    format!("{REFERRAL_CODE_PREFIX}{suffix}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralStats {
    pub referral_code: String,
    pub referral_link: String,
    pub total_referrals: i64,
    pub total_earned: Money,
    pub percentage: Decimal,
    pub paid_orders: usize,
    /// The combined value of the orders that paid out
    pub total_referral_amount: Money,
    pub recent_referral_orders: Vec<ReferralOrderSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralOrderSummary {
    pub id: OrderId,
    pub amount: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for ReferralOrderSummary {
    fn from(order: &Order) -> Self {
        Self { id: order.id, amount: order.amount, currency: order.currency.clone(), created_at: order.created_at }
    }
}

/// The public answer to "does this referral code exist?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCodeOwner {
    pub referral_code: String,
    pub referrer_username: Option<String>,
}

/// The referral payout engine.
///
/// [`ReferralApi::process_referral_earning`] is the only code path that pays referrers. Every flow that confirms a
/// payment calls it, and it is safe to call any number of times for the same order.
pub struct ReferralApi<B> {
    db: B,
    policy: ReferralPolicy,
    frontend_url: String,
    producers: EventProducers,
}

impl<B> Debug for ReferralApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReferralApi ({:?})", self.policy)
    }
}

impl<B: Clone> Clone for ReferralApi<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            policy: self.policy.clone(),
            frontend_url: self.frontend_url.clone(),
            producers: self.producers.clone(),
        }
    }
}

impl<B> ReferralApi<B> {
    pub fn new(db: B, policy: ReferralPolicy, producers: EventProducers) -> Self {
        Self { db, policy, frontend_url: DEFAULT_FRONTEND_URL.to_string(), producers }
    }

    pub fn with_frontend_url(mut self, url: &str) -> Self {
        self.frontend_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn policy(&self) -> &ReferralPolicy {
        &self.policy
    }
}

impl<B> ReferralApi<B>
where B: PaymentGatewayDatabase + ReferralManagement
{
    /// Pays the referrer of the account that placed `order`, exactly once per order.
    ///
    /// Returns `None` when there is nothing to pay: guest orders, accounts nobody referred, and payouts that round
    /// to zero. If the order has already paid out, the existing earning is returned and nothing is credited.
    pub async fn process_referral_earning(&self, order: &Order) -> Result<Option<ReferralEarning>, OrderFlowError> {
        let account_id = match order.account_id {
            Some(id) => id,
            None => {
                trace!("💸️ Order {} is a guest order. No referral payout.", order.id);
                return Ok(None);
            },
        };
        let referrer_id = match self.db.fetch_account(account_id).await?.and_then(|a| a.referred_by) {
            Some(id) => id,
            None => {
                trace!("💸️ Account #{account_id} was not referred. No payout for order {}.", order.id);
                return Ok(None);
            },
        };
        if let Some(existing) = self.db.fetch_referral_earning_for_order(order.id).await? {
            debug!("💸️ Order {} has already paid out {} to #{}", order.id, existing.amount, existing.referrer_id);
            return Ok(Some(existing));
        }
        let percentage = self.policy.percentage();
        let amount = order.amount.percentage(percentage)?;
        if !amount.is_positive() {
            debug!("💸️ A {percentage}% payout on order {} ({}) rounds to zero. Nothing to pay.", order.id, order.amount);
            return Ok(None);
        }
        let earning = NewReferralEarning {
            referrer_id,
            referred_account_id: account_id,
            order_id: order.id,
            amount,
            percentage,
        };
        let (earning, inserted) = self.db.insert_referral_earning(earning).await?;
        if inserted {
            info!("💸️ Referrer #{referrer_id} earned {amount} ({percentage}%) from order {}", order.id);
            for producer in &self.producers.referral_paid_producer {
                producer.publish_event(ReferralPaidEvent::new(earning.clone(), order.clone()));
            }
        } else {
            debug!("💸️ A concurrent payout for order {} got there first", order.id);
        }
        Ok(Some(earning))
    }

    /// Links `account_id` to the owner of `code`.
    pub async fn register_referral(&self, account_id: i64, code: &str) -> Result<Account, OrderFlowError> {
        let code = code.trim().to_ascii_uppercase();
        let account = self.db.fetch_account(account_id).await?.ok_or(OrderFlowError::AccountNotFound(account_id))?;
        if account.referred_by.is_some() {
            return Err(OrderFlowError::Validation("This account already has a referrer".to_string()));
        }
        let referrer = self
            .db
            .fetch_account_by_referral_code(&code)
            .await?
            .ok_or_else(|| OrderFlowError::ReferralCodeNotFound(code.clone()))?;
        if referrer.id == account_id {
            return Err(OrderFlowError::Validation("You cannot use your own referral code".to_string()));
        }
        if !self.db.link_referrer(account_id, referrer.id).await? {
            return Err(OrderFlowError::Validation("This account already has a referrer".to_string()));
        }
        info!("💸️ Account #{account_id} registered with referral code {code} (referrer #{})", referrer.id);
        self.db.fetch_account(account_id).await?.ok_or(OrderFlowError::AccountNotFound(account_id))
    }

    /// Returns the account's referral code, generating one the first time it is asked for.
    pub async fn referral_code(&self, account_id: i64) -> Result<String, OrderFlowError> {
        let account = self.db.fetch_account(account_id).await?.ok_or(OrderFlowError::AccountNotFound(account_id))?;
        if let Some(code) = account.referral_code {
            return Ok(code);
        }
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = generate_referral_code();
            match self.db.assign_referral_code(account_id, &candidate).await {
                Ok(Account { referral_code: Some(code), .. }) => return Ok(code),
                Ok(_) => break,
                // Most likely a collision with another account's code. Try again.
                Err(e) => warn!("💸️ Could not assign referral code {candidate} to #{account_id}: {e}"),
            }
        }
        Err(OrderFlowError::DatabaseError(format!("Could not generate a referral code for account #{account_id}")))
    }

    pub async fn referral_stats(&self, account_id: i64) -> Result<ReferralStats, OrderFlowError> {
        let referral_code = self.referral_code(account_id).await?;
        let account = self.db.fetch_account(account_id).await?.ok_or(OrderFlowError::AccountNotFound(account_id))?;
        let earnings = self.db.fetch_earnings_for_referrer(account_id).await?;
        let orders = self.db.fetch_referral_orders(account_id).await?;
        Ok(ReferralStats {
            referral_link: format!("{}/register?ref={referral_code}", self.frontend_url),
            referral_code,
            total_referrals: account.total_referrals,
            total_earned: account.referral_earnings,
            percentage: self.policy.percentage(),
            paid_orders: earnings.len(),
            total_referral_amount: orders.iter().map(|o| o.amount).sum(),
            recent_referral_orders: orders
                .iter()
                .take(RECENT_REFERRAL_ORDERS)
                .map(ReferralOrderSummary::from)
                .collect(),
        })
    }

    /// Looks up the owner of a referral code. Codes are matched case-insensitively.
    pub async fn validate_code(&self, code: &str) -> Result<Option<ReferralCodeOwner>, OrderFlowError> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Ok(None);
        }
        let owner = self.db.fetch_account_by_referral_code(&code).await?;
        trace!("💸️ Referral code {code} lookup: {}", if owner.is_some() { "found" } else { "not found" });
        Ok(owner.map(|a| ReferralCodeOwner { referral_code: code, referrer_username: a.username }))
    }

    pub async fn earnings_for_referrer(&self, account_id: i64) -> Result<Vec<ReferralEarning>, OrderFlowError> {
        let earnings = self.db.fetch_earnings_for_referrer(account_id).await?;
        Ok(earnings)
    }
}
