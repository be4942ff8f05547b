//! Chat-ops notifications.
//!
//! Operators follow the store from a Telegram chat. The notifier posts a message to every configured admin chat when
//! a manual order needs attention, when an order is paid, and when one is canceled. Delivery is best effort: failures
//! are logged and never reach the order flows.
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use log::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use topup_engine::{
    db_types::Order,
    events::{EventHooks, ManualOrderCreatedEvent, OrderAnnulledEvent, OrderPaidEvent, PaymentSource},
};

use crate::config::TelegramConfig;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Error)]
pub enum TelegramError {
    #[error("Could not initialize the Telegram client. {0}")]
    Initialization(String),
    #[error("Could not reach Telegram. {0}")]
    RequestError(String),
    #[error("Telegram rejected the message ({status}). {message}")]
    Rejected { status: u16, message: String },
}

#[derive(Clone)]
pub struct TelegramNotifier {
    config: TelegramConfig,
    api_url: String,
    client: Arc<Client>,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| TelegramError::Initialization(e.to_string()))?;
        Ok(Self { config, api_url: TELEGRAM_API_URL.to_string(), client: Arc::new(client) })
    }

    pub fn with_api_url<S: Into<String>>(mut self, url: S) -> Self {
        self.api_url = url.into();
        self
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TelegramError> {
        #[derive(Deserialize)]
        struct SendMessageResponse {
            ok: bool,
            #[serde(default)]
            description: Option<String>,
        }
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.config.bot_token.reveal());
        let body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        let response =
            self.client.post(url).json(&body).send().await.map_err(|e| TelegramError::RequestError(e.to_string()))?;
        let status = response.status().as_u16();
        let reply = response
            .json::<SendMessageResponse>()
            .await
            .map_err(|e| TelegramError::RequestError(e.to_string()))?;
        if reply.ok {
            trace!("📬️ Telegram message delivered to chat {chat_id}");
            Ok(())
        } else {
            Err(TelegramError::Rejected { status, message: reply.description.unwrap_or_default() })
        }
    }

    /// Sends `text` to every admin chat. One chat failing does not stop delivery to the others.
    pub async fn broadcast(&self, text: String) {
        let deliveries = self.config.admin_chat_ids.iter().map(|chat_id| {
            let text = text.as_str();
            async move {
                if let Err(e) = self.send_message(chat_id, text).await {
                    warn!("📬️ Could not notify Telegram chat {chat_id}. {e}");
                }
            }
        });
        join_all(deliveries).await;
    }
}

/// Registers the notifier on the events operators care about.
pub fn register_telegram_hooks(hooks: &mut EventHooks, notifier: TelegramNotifier) {
    let on_manual = notifier.clone();
    let on_paid = notifier.clone();
    hooks
        .on_manual_order_created(move |ev| notify(on_manual.clone(), manual_order_message(&ev)))
        .on_order_paid(move |ev| notify(on_paid.clone(), order_paid_message(&ev)))
        .on_order_annulled(move |ev| notify(notifier.clone(), order_annulled_message(&ev)));
}

fn notify(notifier: TelegramNotifier, text: String) -> BoxFuture<'static, ()> {
    Box::pin(async move { notifier.broadcast(text).await })
}

pub fn manual_order_message(ev: &ManualOrderCreatedEvent) -> String {
    let order = &ev.order;
    let title = order.manual_game_name.as_deref().unwrap_or("Unknown title");
    let mut text = format!("🛠 <b>New manual order {}</b>\n<b>Game:</b> {}\n", order.id, escape_html(title));
    text.push_str(&order_summary(order));
    if let Some(comment) = order.comment.as_deref().filter(|c| !c.is_empty()) {
        text.push_str(&format!("\n<b>Comment:</b> {}", escape_html(comment)));
    }
    text
}

pub fn order_paid_message(ev: &OrderPaidEvent) -> String {
    let source = match ev.source {
        PaymentSource::Gateway => "RoboKassa",
        PaymentSource::Internal => "an administrator",
    };
    let mut text = format!("💰 <b>Order {} paid</b> via {source}\n", ev.order.id);
    text.push_str(&order_summary(&ev.order));
    if let Some(email) = ev.payer_email.as_deref() {
        text.push_str(&format!("\n<b>Payer:</b> {}", escape_html(email)));
    }
    if let Some(earning) = &ev.referral {
        text.push_str(&format!("\n<b>Referral payout:</b> {} to account #{}", earning.amount, earning.referrer_id));
    }
    text
}

pub fn order_annulled_message(ev: &OrderAnnulledEvent) -> String {
    let mut text = format!("❌ <b>Order {} canceled</b>\n", ev.order.id);
    text.push_str(&order_summary(&ev.order));
    text.push_str(&format!("\n<b>Refunded:</b> {} {}", ev.refunded, ev.order.currency));
    text
}

fn order_summary(order: &Order) -> String {
    let customer = match (order.account_id, order.attachment.as_ref().and_then(|a| a.contact_email())) {
        (Some(id), _) => format!("account #{id}"),
        (None, Some(email)) => format!("guest {}", escape_html(email)),
        (None, None) => "guest".to_string(),
    };
    format!(
        "<b>Amount:</b> {} {}\n<b>Method:</b> {}\n<b>Customer:</b> {customer}",
        order.amount, order.currency, order.payment_method
    )
}

/// Escapes the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
