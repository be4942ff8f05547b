use chrono::{TimeZone, Utc};
use mockall::mock;
use topup_common::Money;
use topup_engine::{
    db_types::{Account, Order, OrderId, OrderStatusType, PaymentMethod},
    order_objects::OrderQueryFilter,
    traits::{AccountApiError, AccountManagement},
};

mock! {
    pub AccountManager {}
    impl AccountManagement for AccountManager {
        async fn fetch_account(&self, account_id: i64) -> Result<Option<Account>, AccountApiError>;
        async fn fetch_account_by_referral_code(&self, code: &str) -> Result<Option<Account>, AccountApiError>;
        async fn fetch_order_by_id(&self, order_id: OrderId) -> Result<Option<Order>, AccountApiError>;
        async fn fetch_orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, AccountApiError>;
        async fn fetch_manual_orders_for_account(&self, account_id: i64) -> Result<Vec<Order>, AccountApiError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, AccountApiError>;
    }
}

pub fn account(id: i64) -> Account {
    Account {
        id,
        username: Some(format!("player{id}")),
        email: Some(format!("player{id}@example.com")),
        balance: Money::from_whole_units(250),
        referral_code: Some("REFAB12CD34".to_string()),
        referred_by: None,
        referral_earnings: Money::zero(),
        total_referrals: 0,
        created_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
    }
}

pub fn order(id: i64, account_id: i64, amount: i64, status: OrderStatusType) -> Order {
    Order {
        id: OrderId(id),
        account_id: Some(account_id),
        game_id: 1,
        product_id: 2,
        manual_game_name: None,
        amount: Money::from_whole_units(amount),
        currency: "RUB".to_string(),
        status,
        payment_method: PaymentMethod::Sbp,
        transaction_id: None,
        payment_url: None,
        comment: None,
        attachment: None,
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 16, 11, 20, 0).unwrap(),
    }
}
