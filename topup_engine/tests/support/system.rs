use log::*;
use rust_decimal::Decimal;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use topup_common::Money;
use topup_engine::{
    db_types::{Account, CatalogProduct, NewAccount, Order},
    events::EventProducers,
    gateway::{RoboKassaClient, RoboKassaConfig, WebhookPayload},
    AccountApi,
    AccountManagement,
    OrderFlowApi,
    PaymentGatewayDatabase,
    ReferralApi,
    ReferralPolicy,
    SqliteDatabase,
    WebhookApi,
};

use super::prepare_env::{prepare_test_env, random_db_path};

pub const FRONTEND_URL: &str = "https://shop.example.com";

pub fn robokassa() -> RoboKassaClient {
    let config = RoboKassaConfig::new("demo", "password_1", "password_2").with_frontend_url(FRONTEND_URL);
    RoboKassaClient::new(config)
}

/// A complete store over a throw-away database, with a referral rate of 1%.
#[derive(Debug)]
pub struct TestSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: RoboKassaClient,
    pub orders: OrderFlowApi<SqliteDatabase, RoboKassaClient>,
    pub webhooks: WebhookApi<SqliteDatabase, RoboKassaClient>,
    pub referrals: ReferralApi<SqliteDatabase>,
    pub accounts: AccountApi<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        Self::build(robokassa(), producers).await
    }

    pub async fn build(gateway: RoboKassaClient, producers: EventProducers) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let referrals = ReferralApi::new(db.clone(), ReferralPolicy::Fixed(Decimal::ONE), producers.clone())
            .with_frontend_url(FRONTEND_URL);
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), referrals.clone(), producers.clone());
        let webhooks = WebhookApi::new(db.clone(), gateway.clone(), referrals.clone(), producers);
        let accounts = AccountApi::new(db.clone());
        Self { db_path: url, db, gateway, orders, webhooks, referrals, accounts }
    }

    pub async fn customer(&self, name: &str) -> Account {
        let account = NewAccount::new(name).with_email(format!("{name}@example.com"));
        self.db.create_account(account).await.expect("Error creating account")
    }

    /// Creates a customer who signed up with `referrer`'s referral code.
    pub async fn referred_customer(&self, name: &str, referrer: &Account) -> Account {
        let code = self.referrals.referral_code(referrer.id).await.expect("Error fetching referral code");
        let account = self.customer(name).await;
        self.referrals.register_referral(account.id, &code).await.expect("Error registering referral")
    }

    pub async fn product(&self, game: &str, product: &str) -> CatalogProduct {
        self.db.upsert_catalog_product(game, product).await.expect("Error creating product")
    }

    pub async fn account(&self, account_id: i64) -> Account {
        self.db.fetch_account(account_id).await.expect("Error fetching account").expect("Account does not exist")
    }

    pub async fn balance(&self, account_id: i64) -> Money {
        self.account(account_id).await.balance
    }

    pub async fn order(&self, order: &Order) -> Order {
        self.db.fetch_order_by_id(order.id).await.expect("Error fetching order").expect("Order does not exist")
    }

    /// A correctly signed result notification for the order, with `OutSum` written the way RoboKassa writes it.
    pub fn signed_notification(&self, order: &Order) -> WebhookPayload {
        let out_sum = format!("{}0000", order.amount);
        let inv_id = order.id.value().to_string();
        let signature = self.gateway.sign_result(&out_sum, &inv_id, None);
        WebhookPayload { out_sum, inv_id, signature, receipt: None, fee: None, email: None }
    }

    pub async fn tear_down(mut self) {
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&self.db_path).await {
            warn!("🚀️ Could not remove {}: {e}", self.db_path);
        }
    }
}
