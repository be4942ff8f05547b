use std::collections::HashMap;

use cucumber::World;
use topup_engine::{
    db_types::{Account, CatalogProduct, Order},
    OrderFlowError,
    WebhookOutcome,
};

use crate::support::system::TestSystem;

#[derive(Default, Debug, World)]
pub struct StoreWorld {
    pub system: Option<TestSystem>,
    pub customers: HashMap<String, Account>,
    pub products: HashMap<String, CatalogProduct>,
    /// The order the scenario is currently talking about.
    pub order: Option<Order>,
    pub last_outcome: Option<WebhookOutcome>,
    pub last_error: Option<OrderFlowError>,
}

impl StoreWorld {
    pub fn system(&self) -> &TestSystem {
        self.system.as_ref().expect("No store has been set up. Start the scenario with 'Given a fresh store'")
    }

    pub fn customer(&self, name: &str) -> &Account {
        self.customers.get(name).unwrap_or_else(|| panic!("Unknown customer {name}"))
    }

    pub fn product(&self, name: &str) -> &CatalogProduct {
        self.products.get(name).unwrap_or_else(|| panic!("Unknown product {name}"))
    }

    pub fn order(&self) -> &Order {
        self.order.as_ref().expect("No order has been placed yet")
    }

    /// Records the result of an operation, keeping the error around for later `Then` steps.
    pub fn record<T>(&mut self, result: Result<T, OrderFlowError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                self.last_error = Some(e);
                None
            },
        }
    }
}
