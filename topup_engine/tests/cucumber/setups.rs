use cucumber::given;

use crate::{cucumber::StoreWorld, support::system::TestSystem};

#[given("a fresh store")]
async fn fresh_store(world: &mut StoreWorld) {
    world.system = Some(TestSystem::new().await);
}

#[given(expr = "a customer named {word}")]
async fn customer(world: &mut StoreWorld, name: String) {
    let account = world.system().customer(&name).await;
    world.customers.insert(name, account);
}

#[given(expr = "{word} signed up with {word}'s referral code")]
async fn referred_customer(world: &mut StoreWorld, name: String, referrer: String) {
    let referrer = world.customer(&referrer).clone();
    let account = world.system().referred_customer(&name, &referrer).await;
    world.customers.insert(name, account);
}

#[given(expr = "the game {string} sells {string}")]
async fn product(world: &mut StoreWorld, game: String, product_name: String) {
    let p = world.system().product(&game, &product_name).await;
    world.products.insert(product_name, p);
}
