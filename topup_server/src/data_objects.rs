use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topup_common::{helpers::parse_list, Money};
use topup_engine::{
    db_types::{OrderStatusType, PaymentMethod},
    order_objects::OrderQueryFilter,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: OrderStatusType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub amount: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReferralRequest {
    pub referral_code: String,
}

/// The query string RoboKassa appends when it sends the customer back to the shop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayRedirectParams {
    #[serde(rename = "InvId", default)]
    pub inv_id: Option<String>,
    #[serde(rename = "OutSum", default)]
    pub out_sum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodInfo {
    pub method: PaymentMethod,
    pub name: String,
    pub description: String,
}

impl PaymentMethodInfo {
    pub fn for_method(method: PaymentMethod) -> Self {
        let (name, description) = match method {
            PaymentMethod::Sberbank => ("Bank card", "Visa, MasterCard, MIR"),
            PaymentMethod::Sbp => ("SBP", "Faster Payments System"),
            _ => ("Other", "Paid outside the hosted payment page"),
        };
        Self { method, name: name.to_string(), description: description.to_string() }
    }
}

/// Admin order search parameters, as they arrive in a query string. `status` is a comma-separated list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSearchParams {
    pub account_id: Option<i64>,
    pub currency: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub manual: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl OrderSearchParams {
    /// Converts the parameters into an engine query. Unknown statuses are returned as the error.
    pub fn into_filter(self) -> Result<OrderQueryFilter, String> {
        let status = match self.status {
            Some(s) => {
                let (statuses, rejected) = parse_list::<OrderStatusType>(&s);
                if !rejected.is_empty() {
                    return Err(format!("Unknown order status(es): {}", rejected.join(", ")));
                }
                Some(statuses)
            },
            None => None,
        };
        Ok(OrderQueryFilter {
            account_id: self.account_id,
            currency: self.currency,
            payment_method: self.payment_method,
            manual: self.manual,
            since: self.since,
            until: self.until,
            status,
        })
    }
}
