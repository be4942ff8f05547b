use std::collections::BTreeMap;

use log::*;
use serde::Serialize;
use serde_json::{value::RawValue, Value};

use crate::api::errors::OrderFlowError;

const OUT_SUM: [&str; 2] = ["OutSum", "amount"];
const INV_ID: [&str; 2] = ["InvId", "order_id"];
const SIGNATURE: [&str; 2] = ["SignatureValue", "signature"];
const RECEIPT: [&str; 1] = ["Receipt"];
const FEE: [&str; 1] = ["Fee"];
const EMAIL: [&str; 1] = ["EMail"];

/// The fields of a payment result notification.
///
/// Values are kept exactly as they arrived, since the signature covers the literal text. RoboKassa sends
/// `OutSum=1500.000000`, and re-formatting that before verification would reject a genuine notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub out_sum: String,
    pub inv_id: String,
    pub signature: String,
    pub receipt: Option<String>,
    pub fee: Option<String>,
    pub email: Option<String>,
}

impl WebhookPayload {
    /// Extracts the notification fields from a request body.
    ///
    /// The body is decoded as `application/x-www-form-urlencoded` first and as JSON if that does not produce the
    /// mandatory fields, whatever the content type says. Field names are matched case-insensitively, and the
    /// short names (`amount`, `order_id`, `signature`) are accepted too.
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self, OrderFlowError> {
        trace!("🧾️ Parsing payment notification. Content type: {content_type:?}, {} bytes", body.len());
        let form = url::form_urlencoded::parse(body).into_owned().collect::<Vec<(String, String)>>();
        if let Some(payload) = Self::from_fields(&form) {
            return Ok(payload);
        }
        let fields = json_fields(body);
        Self::from_fields(&fields).ok_or_else(|| {
            warn!("🧾️ Payment notification is missing OutSum, InvId or SignatureValue");
            OrderFlowError::Validation("Invalid parameters".to_string())
        })
    }

    fn from_fields(fields: &[(String, String)]) -> Option<Self> {
        let out_sum = lookup(fields, &OUT_SUM)?;
        let inv_id = lookup(fields, &INV_ID)?;
        let signature = lookup(fields, &SIGNATURE)?;
        Some(Self {
            out_sum,
            inv_id,
            signature,
            receipt: lookup(fields, &RECEIPT),
            fee: lookup(fields, &FEE),
            email: lookup(fields, &EMAIL),
        })
    }
}

fn lookup(fields: &[(String, String)], names: &[&str]) -> Option<String> {
    fields
        .iter()
        .find(|(k, _)| names.iter().any(|n| n.eq_ignore_ascii_case(k)))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Top-level scalars only. Numbers keep the literal text they were sent with, so `1500.00` stays `1500.00` and
// still matches the signature.
fn json_fields(body: &[u8]) -> Vec<(String, String)> {
    let Ok(map) = serde_json::from_slice::<BTreeMap<String, Box<RawValue>>>(body) else {
        return Vec::new();
    };
    map.into_iter().filter_map(|(k, raw)| json_scalar(raw.get()).map(|v| (k, v))).collect()
}

fn json_scalar(raw: &str) -> Option<String> {
    match serde_json::from_str::<Value>(raw).ok()? {
        Value::String(s) => Some(s),
        Value::Number(_) => Some(raw.trim().to_string()),
        _ => None,
    }
}
