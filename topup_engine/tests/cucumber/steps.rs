use std::collections::BTreeMap;

use cucumber::{then, when};
use log::*;
use topup_common::Money;
use topup_engine::{
    db_types::{OrderStatusType, PaymentMethod},
    order_objects::{NewOrderRequest, Trust},
    ErrorKind,
    OrderFlowError,
    ReferralManagement,
    WebhookOutcome,
};

use crate::cucumber::StoreWorld;

fn money(s: &str) -> Money {
    s.parse().unwrap_or_else(|e| panic!("{s} is not an amount: {e}"))
}

#[when(expr = "{word} orders {string} for {word} RUB paying with {word}")]
async fn place_order(world: &mut StoreWorld, name: String, product: String, amount: String, method: String) {
    let account_id = world.customer(&name).id;
    let product = world.product(&product).clone();
    let payment_method = method.parse::<PaymentMethod>().expect("Unknown payment method");
    let request = NewOrderRequest {
        game_id: product.game_id,
        product_id: product.id,
        amount: money(&amount),
        currency: "RUB".into(),
        payment_method,
        comment: None,
        answers: BTreeMap::new(),
        paid: false,
    };
    let result = world.system().orders.create_order(account_id, request, Trust::Untrusted).await;
    if let Some(result) = world.record(result) {
        debug!("🧾️ Order {} placed for {name}", result.order.id);
        world.order = Some(result.order);
    }
}

#[when("the gateway confirms the payment")]
async fn gateway_confirms(world: &mut StoreWorld) {
    let payload = world.system().signed_notification(world.order());
    let result = world.system().webhooks.process_payment_result(payload).await;
    world.last_outcome = world.record(result);
}

#[when(expr = "the gateway reports a payment of {word} RUB")]
async fn gateway_reports_amount(world: &mut StoreWorld, amount: String) {
    let mut payload = world.system().signed_notification(world.order());
    payload.out_sum = amount;
    payload.signature = world.system().gateway.sign_result(&payload.out_sum, &payload.inv_id, None);
    let result = world.system().webhooks.process_payment_result(payload).await;
    world.last_outcome = world.record(result);
}

#[when("a forged payment notification arrives")]
async fn forged_notification(world: &mut StoreWorld) {
    let mut payload = world.system().signed_notification(world.order());
    payload.signature = "0".repeat(32);
    let result = world.system().webhooks.process_payment_result(payload).await;
    world.last_outcome = world.record(result);
}

#[when(expr = "{word} cancels the order")]
async fn cancel(world: &mut StoreWorld, name: String) {
    let account_id = world.customer(&name).id;
    let order_id = world.order().id;
    let result = world.system().orders.cancel_order(order_id, account_id).await;
    if let Some(order) = world.record(result) {
        world.order = Some(order);
    }
}

#[when(expr = "an admin refunds {word} RUB on the order")]
async fn refund(world: &mut StoreWorld, amount: String) {
    let order_id = world.order().id;
    let result = world.system().orders.refund_order(order_id, money(&amount)).await;
    if let Some(order) = world.record(result) {
        world.order = Some(order);
    }
}

#[when(expr = "an admin moves the order to {word}")]
async fn update_status(world: &mut StoreWorld, status: String) {
    let status = status.parse::<OrderStatusType>().expect("Unknown order status");
    let order_id = world.order().id;
    let result = world.system().orders.update_order_status(order_id, status).await;
    if let Some(order) = world.record(result) {
        world.order = Some(order);
    }
}

#[then(expr = "the order is {word}")]
async fn order_status(world: &mut StoreWorld, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Unknown order status");
    let order = world.system().order(world.order()).await;
    assert_eq!(order.status, expected);
}

#[then("the order has a payment link")]
async fn has_payment_link(world: &mut StoreWorld) {
    let order = world.system().order(world.order()).await;
    let url = order.payment_url.expect("The order has no payment link");
    assert!(url.contains(&format!("InvId={}", order.id.value())), "Unexpected payment link {url}");
}

#[then("the payment is processed")]
async fn processed(world: &mut StoreWorld) {
    assert!(matches!(world.last_outcome, Some(WebhookOutcome::Processed(_))), "{:?}", world.last_outcome);
}

#[then("the payment is acknowledged as a repeat")]
async fn repeat(world: &mut StoreWorld) {
    assert!(matches!(world.last_outcome, Some(WebhookOutcome::AlreadyProcessed(_))), "{:?}", world.last_outcome);
    let ack = world.last_outcome.as_ref().map(|o| o.acknowledgement());
    assert_eq!(ack, Some(format!("OK{}", world.order().id.value())));
}

#[then("the notification is rejected for its signature")]
async fn bad_signature(world: &mut StoreWorld) {
    assert!(matches!(world.last_error, Some(OrderFlowError::InvalidSignature)), "{:?}", world.last_error);
}

#[then(expr = "the request fails with a {word} error")]
async fn failed_with(world: &mut StoreWorld, kind: String) {
    let expected = match kind.as_str() {
        "validation" => ErrorKind::Validation,
        "auth" => ErrorKind::Auth,
        "not-found" => ErrorKind::NotFound,
        "conflict" => ErrorKind::StateConflict,
        "gateway" => ErrorKind::Gateway,
        _ => panic!("Unknown error kind {kind}"),
    };
    let err = world.last_error.as_ref().expect("The last request succeeded");
    assert_eq!(err.kind(), expected, "{err}");
}

#[then(expr = "{word} has a balance of {word} RUB")]
async fn balance(world: &mut StoreWorld, name: String, amount: String) {
    let account_id = world.customer(&name).id;
    assert_eq!(world.system().balance(account_id).await, money(&amount));
}

#[then(expr = "{word} has earned {word} RUB from {int} referral payout(s)")]
async fn referral_earnings(world: &mut StoreWorld, name: String, amount: String, count: usize) {
    let account_id = world.customer(&name).id;
    let account = world.system().account(account_id).await;
    assert_eq!(account.referral_earnings, money(&amount));
    let earnings = world.system().db.fetch_earnings_for_referrer(account_id).await.expect("Error fetching earnings");
    assert_eq!(earnings.len(), count);
}
