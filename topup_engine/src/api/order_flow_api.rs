use std::fmt::Debug;

use log::*;
use topup_common::Money;

use crate::{
    api::{
        errors::OrderFlowError,
        order_objects::{
            BulkOrderLine,
            BulkOrderRequest,
            GuestBulkOrderRequest,
            ManualOrderRequest,
            NewOrderRequest,
            NewOrderResult,
            Trust,
        },
        referral_api::ReferralApi,
    },
    db_types::{
        CatalogProduct,
        GuestContact,
        LineAnswers,
        NewOrder,
        Order,
        OrderAttachment,
        OrderId,
        OrderStatusType,
        PaymentMethod,
        ReferralEarning,
    },
    events::{
        EventProducers,
        ManualOrderCreatedEvent,
        OrderAnnulledEvent,
        OrderCompletedEvent,
        OrderCreatedEvent,
        OrderPaidEvent,
        PaymentSource,
    },
    gateway::{GatewayError, PaymentGateway},
    traits::{PaymentGatewayDatabase, ReferralManagement},
};

const DESCRIPTION_ITEM_LIMIT: usize = 3;

/// `OrderFlowApi` is the primary API for creating orders and moving them through their life cycle.
///
/// Every operation that changes an order's status does so with a compare-and-swap on the status it expects to find,
/// and every operation that moves money does it in the same transaction as the status change.
pub struct OrderFlowApi<B, G> {
    db: B,
    gateway: G,
    referrals: ReferralApi<B>,
    producers: EventProducers,
}

impl<B, G> Debug for OrderFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone, G: Clone> Clone for OrderFlowApi<B, G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            gateway: self.gateway.clone(),
            referrals: self.referrals.clone(),
            producers: self.producers.clone(),
        }
    }
}

impl<B, G> OrderFlowApi<B, G> {
    pub fn new(db: B, gateway: G, referrals: ReferralApi<B>, producers: EventProducers) -> Self {
        Self { db, gateway, referrals, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn referrals(&self) -> &ReferralApi<B> {
        &self.referrals
    }
}

impl<B, G> OrderFlowApi<B, G>
where
    B: PaymentGatewayDatabase + ReferralManagement,
    G: PaymentGateway,
{
    /// Places a single order for a signed-in customer.
    ///
    /// If the payment method is one of the hosted gateway methods, a payment URL is requested. A gateway that is
    /// down or slow does not stop the order from being created; the problem is reported in
    /// [`NewOrderResult::warnings`] instead.
    ///
    /// `paid` orders are only accepted from trusted callers, and only for [`PaymentMethod::Auto`].
    pub async fn create_order(
        &self,
        account_id: i64,
        request: NewOrderRequest,
        trust: Trust,
    ) -> Result<NewOrderResult, OrderFlowError> {
        if request.paid {
            if trust != Trust::Trusted {
                warn!("🔄️ Account #{account_id} tried to create an order that is already paid");
                return Err(OrderFlowError::Unauthorized("Only administrators can create paid orders".to_string()));
            }
            if request.payment_method != PaymentMethod::Auto {
                return Err(OrderFlowError::Validation(format!(
                    "Only {} orders can be created as paid, not {}",
                    PaymentMethod::Auto,
                    request.payment_method
                )));
            }
        }
        validate_amount(request.amount, &request.currency)?;
        self.check_account(account_id).await?;
        let product = self.catalog_product(request.game_id, request.product_id).await?;
        let lines = vec![LineAnswers { product_id: request.product_id, answers: request.answers }];
        let mut order = NewOrder::new(
            request.game_id,
            request.product_id,
            request.amount,
            &request.currency,
            request.payment_method,
        )
        .for_account(account_id)
        .with_attachment(OrderAttachment::build(None, lines));
        if let Some(comment) = non_empty(request.comment) {
            order = order.with_comment(comment);
        }
        let order = self.db.insert_order(order).await?;
        debug!("🔄️ Order {} created for account #{account_id}", order.id);
        self.publish_order_created(&order);

        let mut result = self.with_payment_url(order, &[product.name]).await;
        if request.paid {
            let (order, referral) = self.mark_order_paid(result.order.id).await?;
            result.order = order;
            result.referral = referral;
        }
        Ok(result)
    }

    /// Places an order for a title that is not in the catalog. An operator fulfils these by hand.
    ///
    /// Without a product id, the order points at the placeholder catalog entry for manual orders.
    pub async fn create_manual_order(
        &self,
        account_id: i64,
        request: ManualOrderRequest,
    ) -> Result<NewOrderResult, OrderFlowError> {
        let game_name = request.manual_game_name.trim();
        if game_name.is_empty() {
            return Err(OrderFlowError::Validation("A manual order must name the game".to_string()));
        }
        validate_amount(request.amount, &request.currency)?;
        self.check_account(account_id).await?;
        let product = match request.product_id {
            Some(product_id) => self.catalog_product_in(request.game_id, product_id).await?,
            None => {
                if request.game_id.is_some() {
                    debug!("🔄️ Manual order without a product id. The given game id is ignored.");
                }
                self.db.fetch_or_create_manual_placeholder().await?
            },
        };
        let method = PaymentMethod::Manual;
        let mut order = NewOrder::new(product.game_id, product.id, request.amount, &request.currency, method)
            .for_account(account_id)
            .with_manual_game_name(game_name);
        if let Some(comment) = non_empty(request.comment) {
            order = order.with_comment(comment);
        }
        let order = self.db.insert_order(order).await?;
        info!("🔄️ Manual order {} for '{game_name}' created for account #{account_id}", order.id);
        self.publish_order_created(&order);
        for producer in &self.producers.manual_order_created_producer {
            producer.publish_event(ManualOrderCreatedEvent::new(order.clone()));
        }
        Ok(NewOrderResult::new(order))
    }

    /// Places one order covering several catalog items for a signed-in customer. The first line decides the game,
    /// product and payment method recorded on the order.
    pub async fn create_bulk_order(
        &self,
        account_id: i64,
        request: BulkOrderRequest,
    ) -> Result<NewOrderResult, OrderFlowError> {
        self.check_account(account_id).await?;
        self.create_bulk(Some(account_id), request.items, None).await
    }

    /// As [`Self::create_bulk_order`], for a customer without an account. A contact email is required.
    pub async fn create_guest_bulk_order(
        &self,
        request: GuestBulkOrderRequest,
    ) -> Result<NewOrderResult, OrderFlowError> {
        let email = request.email.as_deref().map(str::trim).unwrap_or_default();
        if email.is_empty() || !email.contains('@') {
            return Err(OrderFlowError::Validation("A valid contact email is required".to_string()));
        }
        let contact = GuestContact { email: email.to_string(), name: non_empty(request.name) };
        self.create_bulk(None, request.items, Some(contact)).await
    }

    async fn create_bulk(
        &self,
        account_id: Option<i64>,
        items: Vec<BulkOrderLine>,
        contact: Option<GuestContact>,
    ) -> Result<NewOrderResult, OrderFlowError> {
        let first = items
            .first()
            .cloned()
            .ok_or_else(|| OrderFlowError::Validation("An order must contain at least one item".to_string()))?;
        let mut product_names = Vec::with_capacity(items.len());
        for line in &items {
            validate_amount(line.amount, &line.currency)?;
            if line.currency != first.currency {
                return Err(OrderFlowError::Validation(format!(
                    "All items must be priced in the same currency. Found {} and {}",
                    first.currency, line.currency
                )));
            }
            let product = self.catalog_product(line.game_id, line.product_id).await?;
            product_names.push(product.name);
        }
        let total = items
            .iter()
            .try_fold(Money::zero(), |total, l| total.checked_add(l.amount))
            .ok_or_else(|| OrderFlowError::Validation("Order total is out of range".to_string()))?;
        let comment = items
            .iter()
            .filter_map(|l| {
                l.comment.as_deref().map(str::trim).filter(|c| !c.is_empty()).map(|c| format!("[{}] {c}", l.product_id))
            })
            .collect::<Vec<String>>()
            .join("\n");
        let lines = items
            .into_iter()
            .map(|l| LineAnswers { product_id: l.product_id, answers: l.answers })
            .collect::<Vec<LineAnswers>>();
        let mut order = NewOrder::new(first.game_id, first.product_id, total, &first.currency, first.payment_method)
            .with_attachment(OrderAttachment::build(contact, lines));
        if let Some(account_id) = account_id {
            order = order.for_account(account_id);
        }
        if !comment.is_empty() {
            order = order.with_comment(comment);
        }
        let order = self.db.insert_order(order).await?;
        let count = product_names.len();
        match account_id {
            Some(id) => debug!("🔄️ Bulk order {} ({count} items, {total}) created for account #{id}", order.id),
            None => debug!("🔄️ Guest bulk order {} ({count} items, {total}) created", order.id),
        }
        self.publish_order_created(&order);
        Ok(self.with_payment_url(order, &product_names).await)
    }

    /// Cancels a pending order at the owner's request and returns the full amount to their balance.
    pub async fn cancel_order(&self, order_id: OrderId, account_id: i64) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if !order.is_owned_by(account_id) {
            debug!("🔄️ Account #{account_id} tried to cancel order {order_id}, which it does not own");
            return Err(OrderFlowError::OrderNotFound(order_id));
        }
        if order.status != OrderStatusType::Pending {
            return Err(OrderFlowError::state_conflict(order_id, order.status, "cancel"));
        }
        self.annul(order_id, OrderStatusType::Pending, order.amount, "cancel").await
    }

    /// Cancels a pending order and credits `amount`, which may be anything from zero to the order total, to the
    /// owner's balance.
    pub async fn refund_order(&self, order_id: OrderId, amount: Money) -> Result<Order, OrderFlowError> {
        if amount < Money::zero() {
            return Err(OrderFlowError::Validation("Refund amount cannot be negative".to_string()));
        }
        let order = self.fetch_order(order_id).await?;
        if order.is_guest_order() {
            return Err(OrderFlowError::GuestOrder(order_id));
        }
        if amount > order.amount {
            return Err(OrderFlowError::Validation(format!(
                "Refund of {amount} is more than the order total of {}",
                order.amount
            )));
        }
        if order.status != OrderStatusType::Pending {
            return Err(OrderFlowError::state_conflict(order_id, order.status, "refund"));
        }
        self.annul(order_id, OrderStatusType::Pending, amount, "refund").await
    }

    /// Cancels an order that has already been paid for and credits the full amount to the owner's balance.
    pub async fn refund_paid_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if order.is_guest_order() {
            return Err(OrderFlowError::GuestOrder(order_id));
        }
        if !matches!(order.status, OrderStatusType::Paid | OrderStatusType::Processing) {
            return Err(OrderFlowError::state_conflict(order_id, order.status, "refund a paid"));
        }
        self.annul(order_id, order.status, order.amount, "refund a paid").await
    }

    async fn annul(
        &self,
        order_id: OrderId,
        from: OrderStatusType,
        refund: Money,
        action: &str,
    ) -> Result<Order, OrderFlowError> {
        let order = match self.db.cancel_with_refund(order_id, from, refund).await? {
            Some(order) => order,
            None => return Err(self.lost_race(order_id, action).await),
        };
        info!("🔄️ Order {order_id} canceled. {refund} {} returned to the customer.", order.currency);
        for producer in &self.producers.order_annulled_producer {
            producer.publish_event(OrderAnnulledEvent::new(order.clone(), refund));
        }
        Ok(order)
    }

    /// Moves an order to `new_status`, following the order state machine.
    ///
    /// Cancellations move money, so they go through [`Self::cancel_order`], [`Self::refund_order`] or
    /// [`Self::refund_paid_order`] and are rejected here.
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatusType,
    ) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        let action = format!("move to {new_status}");
        if new_status == OrderStatusType::Canceled || !order.status.can_transition_to(new_status) {
            return Err(OrderFlowError::state_conflict(order_id, order.status, action));
        }
        let old_status = order.status;
        let order = match self.db.try_transition_status(order_id, old_status, new_status).await? {
            Some(order) => order,
            None => return Err(self.lost_race(order_id, &action).await),
        };
        info!("🔄️ Order {order_id} moved from {old_status} to {new_status}");
        if new_status.is_payment_confirmed() {
            let referral = self.pay_referral(&order).await;
            if !old_status.is_payment_confirmed() {
                self.publish_order_paid(&order, referral);
            }
        }
        if new_status == OrderStatusType::Done {
            for producer in &self.producers.order_completed_producer {
                producer.publish_event(OrderCompletedEvent::new(order.clone()));
            }
        }
        Ok(order)
    }

    /// Records that a pending order has been paid by some means the store trusts but cannot verify itself.
    ///
    /// Returns the updated order and the referral payout, if the order earned one.
    pub async fn mark_order_paid(&self, order_id: OrderId) -> Result<(Order, Option<ReferralEarning>), OrderFlowError> {
        let action = "mark as paid";
        let order = self.fetch_order(order_id).await?;
        if order.status != OrderStatusType::Pending {
            return Err(OrderFlowError::state_conflict(order_id, order.status, action));
        }
        let transition = self.db.try_transition_status(order_id, OrderStatusType::Pending, OrderStatusType::Paid);
        let order = match transition.await? {
            Some(order) => order,
            None => return Err(self.lost_race(order_id, action).await),
        };
        info!("🔄️ Order {order_id} marked as paid");
        let referral = self.pay_referral(&order).await;
        self.publish_order_paid(&order, referral.clone());
        Ok((order, referral))
    }

    /// Requests a fresh hosted payment page for a pending order.
    ///
    /// The new URL replaces the stored one. Both carry the same invoice id, so whichever the customer pays through
    /// is reconciled against the same order.
    pub async fn regenerate_payment_url(&self, order_id: OrderId, account_id: i64) -> Result<Order, OrderFlowError> {
        let order = self.fetch_order(order_id).await?;
        if !order.is_owned_by(account_id) {
            return Err(OrderFlowError::OrderNotFound(order_id));
        }
        if order.status != OrderStatusType::Pending {
            return Err(OrderFlowError::state_conflict(order_id, order.status, "create a payment link for"));
        }
        if !order.payment_method.uses_hosted_gateway() {
            return Err(OrderFlowError::Validation(format!(
                "Orders paid with {} do not use a payment link",
                order.payment_method
            )));
        }
        if order.payment_url.is_some() {
            warn!("🔄️ Replacing the payment link for order {order_id}. The previous link remains valid at the gateway.");
        }
        let names = self.db.fetch_product(order.product_id).await?.map(|p| vec![p.name]).unwrap_or_default();
        let order = self.request_payment_url(&order, &names).await?;
        Ok(order)
    }

    //-------------------------------------- private helpers ------------------------------------------------------

    async fn fetch_order(&self, order_id: OrderId) -> Result<Order, OrderFlowError> {
        self.db.fetch_order_by_id(order_id).await?.ok_or(OrderFlowError::OrderNotFound(order_id))
    }

    async fn check_account(&self, account_id: i64) -> Result<(), OrderFlowError> {
        match self.db.fetch_account(account_id).await? {
            Some(_) => Ok(()),
            None => Err(OrderFlowError::AccountNotFound(account_id)),
        }
    }

    async fn catalog_product(&self, game_id: i64, product_id: i64) -> Result<CatalogProduct, OrderFlowError> {
        self.catalog_product_in(Some(game_id), product_id).await
    }

    async fn catalog_product_in(
        &self,
        game_id: Option<i64>,
        product_id: i64,
    ) -> Result<CatalogProduct, OrderFlowError> {
        match self.db.fetch_product(product_id).await? {
            Some(p) if game_id.map(|g| g == p.game_id).unwrap_or(true) => Ok(p),
            Some(p) => {
                debug!("🔄️ Product {product_id} belongs to game {}, not {game_id:?}", p.game_id);
                Err(OrderFlowError::ProductNotFound(product_id))
            },
            None => Err(OrderFlowError::ProductNotFound(product_id)),
        }
    }

    /// The compare-and-swap found a different status to the one we read a moment ago. Report what it is now.
    async fn lost_race(&self, order_id: OrderId, action: &str) -> OrderFlowError {
        match self.db.fetch_order_by_id(order_id).await {
            Ok(Some(order)) => {
                debug!("🔄️ Order {order_id} changed to {} while trying to {action} it", order.status);
                OrderFlowError::state_conflict(order_id, order.status, action)
            },
            Ok(None) => OrderFlowError::OrderNotFound(order_id),
            Err(e) => e.into(),
        }
    }

    async fn with_payment_url(&self, order: Order, product_names: &[String]) -> NewOrderResult {
        if !order.payment_method.uses_hosted_gateway() {
            return NewOrderResult::new(order);
        }
        match self.request_payment_url(&order, product_names).await {
            Ok(order) => NewOrderResult::new(order),
            Err(e) => {
                warn!("🔄️ Order {} was created without a payment link. {e}", order.id);
                NewOrderResult::new(order).with_warning(format!("Could not create a payment link: {e}"))
            },
        }
    }

    async fn request_payment_url(&self, order: &Order, product_names: &[String]) -> Result<Order, OrderFlowError> {
        let description = payment_description(order.id, product_names);
        let timeout = self.gateway.request_timeout();
        let request = self.gateway.create_payment_url(order.id, order.amount, &description, None);
        let url = tokio::time::timeout(timeout, request).await.map_err(|_| GatewayError::Timeout(timeout))??;
        trace!("🔄️ Payment link for order {}: {url}", order.id);
        let order = self.db.set_payment_url(order.id, &url).await?;
        Ok(order)
    }

    async fn pay_referral(&self, order: &Order) -> Option<ReferralEarning> {
        self.referrals
            .process_referral_earning(order)
            .await
            .map_err(|e| error!("🔄️ Referral payout for order {} failed. {e}", order.id))
            .ok()
            .flatten()
    }

    fn publish_order_created(&self, order: &Order) {
        for producer in &self.producers.order_created_producer {
            producer.publish_event(OrderCreatedEvent::new(order.clone()));
        }
    }

    fn publish_order_paid(&self, order: &Order, referral: Option<ReferralEarning>) {
        for producer in &self.producers.order_paid_producer {
            let event = OrderPaidEvent::new(order.clone(), PaymentSource::Internal).with_referral(referral.clone());
            producer.publish_event(event);
        }
    }
}

fn validate_amount(amount: Money, currency: &str) -> Result<(), OrderFlowError> {
    if !amount.is_positive() {
        return Err(OrderFlowError::Validation(format!("Order amount must be positive, not {amount}")));
    }
    if currency.trim().is_empty() {
        return Err(OrderFlowError::Validation("Currency is required".to_string()));
    }
    Ok(())
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// `Order #12: Gems, Gold` for short orders, `Order #12: A, B, C and 2 more item(s)` for long ones.
pub fn payment_description(order_id: OrderId, product_names: &[String]) -> String {
    let shown = product_names.iter().take(DESCRIPTION_ITEM_LIMIT).cloned().collect::<Vec<String>>().join(", ");
    let mut description = format!("Order {order_id}: {shown}");
    if product_names.len() > DESCRIPTION_ITEM_LIMIT {
        description.push_str(&format!(" and {} more item(s)", product_names.len() - DESCRIPTION_ITEM_LIMIT));
    }
    description
}
