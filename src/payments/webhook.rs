use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{ApiError, ApiResult},
    invoices::{
        lifecycle::{apply_payment, CapturedPayment, PaymentOutcome},
        repo,
    },
    state::AppState,
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Constant-time check of a hex HMAC-SHA256 over the raw request body.
pub fn verify_signature(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: EventPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventPayload {
    pub payment: Option<Wrapped<PaymentEntity>>,
    pub payment_link: Option<Wrapped<LinkEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct Wrapped<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    /// Minor units
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    pub method: Option<String>,
    pub order_id: Option<String>,
    #[serde(default)]
    pub notes: Notes,
}

#[derive(Debug, Deserialize)]
pub struct LinkEntity {
    pub id: String,
    #[serde(default)]
    pub notes: Notes,
}

/// Razorpay sends an empty array instead of an object when no notes are set.
#[derive(Debug, Default, Deserialize)]
#[serde(from = "Value")]
pub struct Notes {
    pub invoice_number: Option<String>,
}

impl From<Value> for Notes {
    fn from(v: Value) -> Self {
        Notes {
            invoice_number: v
                .get("invoice_number")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// A payment the invoice ledger should record, plus how to find its invoice.
#[derive(Debug)]
pub struct PaymentLookup {
    pub link_ids: Vec<String>,
    pub invoice_number: Option<String>,
    pub payment: CapturedPayment,
}

impl WebhookEvent {
    /// `None` for events that do not move money.
    pub fn captured_payment(self) -> Option<PaymentLookup> {
        let payment = self.payload.payment?.entity;
        let link = self.payload.payment_link.map(|w| w.entity);
        match self.event.as_str() {
            "payment.captured" if payment.status == "captured" => {}
            "payment_link.paid" => {}
            _ => return None,
        }

        let mut link_ids = Vec::with_capacity(2);
        if let Some(l) = &link {
            link_ids.push(l.id.clone());
        }
        if let Some(order) = payment.order_id.filter(|o| !o.is_empty()) {
            link_ids.push(order);
        }
        let invoice_number = payment
            .notes
            .invoice_number
            .or_else(|| link.and_then(|l| l.notes.invoice_number));

        Some(PaymentLookup {
            link_ids,
            invoice_number,
            payment: CapturedPayment {
                amount: Decimal::new(payment.amount, 2),
                method: payment.method.unwrap_or_else(|| "razorpay".into()),
                transaction_id: payment.id,
            },
        })
    }
}

#[instrument(skip(state, headers, body))]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    if let Some(secret) = state.config.razorpay.webhook_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, secret) {
            warn!("webhook signature mismatch");
            return Err(ApiError::Unauthorized("Invalid webhook signature".into()));
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "unparseable webhook body");
        ApiError::bad_request("Invalid webhook payload")
    })?;
    let name = event.event.clone();

    let Some(lookup) = event.captured_payment() else {
        debug!(event = %name, "webhook ignored");
        return Ok(Json(json!({ "received": true })));
    };

    let mut tx = state.db.begin().await?;
    let Some(mut invoice) =
        repo::lock_for_payment(&mut tx, &lookup.link_ids, lookup.invoice_number.as_deref()).await?
    else {
        warn!(
            event = %name,
            link_ids = ?lookup.link_ids,
            invoice_number = ?lookup.invoice_number,
            "no invoice for payment"
        );
        return Err(ApiError::not_found("Invoice not found for payment"));
    };

    let transaction_id = lookup.payment.transaction_id.clone();
    let amount = lookup.payment.amount;
    match apply_payment(&mut invoice, lookup.payment, OffsetDateTime::now_utc()) {
        PaymentOutcome::Duplicate => {
            info!(invoice = %invoice.invoice_number, %transaction_id, "payment already recorded");
            Ok(Json(json!({ "received": true, "duplicate": true })))
        }
        PaymentOutcome::Applied(kind) => {
            repo::save_payment(&mut tx, &invoice).await?;
            tx.commit().await?;
            info!(
                invoice = %invoice.invoice_number,
                %transaction_id,
                %amount,
                kind = ?kind,
                status = %invoice.status,
                balance = %invoice.balance,
                "payment recorded"
            );
            Ok(Json(json!({ "success": true })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{app::build_app, state::AppState};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn event(json: Value) -> WebhookEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn signature_must_match_body_and_secret() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign(body, "whsec");
        assert!(verify_signature(body, &sig, "whsec"));
        assert!(!verify_signature(body, &sig, "other"));
        assert!(!verify_signature(b"{}", &sig, "whsec"));
        assert!(!verify_signature(body, "not-hex", "whsec"));
    }

    #[test]
    fn captured_payment_is_extracted_in_major_units() {
        let lookup = event(json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_1", "amount": 123450, "status": "captured",
                "method": "upi", "order_id": "order_9",
                "notes": { "invoice_number": "INV-20250101-1234" }
            }}}
        }))
        .captured_payment()
        .unwrap();
        assert_eq!(lookup.payment.amount, "1234.50".parse::<Decimal>().unwrap());
        assert_eq!(lookup.payment.method, "upi");
        assert_eq!(lookup.link_ids, vec!["order_9"]);
        assert_eq!(lookup.invoice_number.as_deref(), Some("INV-20250101-1234"));
    }

    #[test]
    fn link_paid_event_looks_up_by_link_id_first() {
        let lookup = event(json!({
            "event": "payment_link.paid",
            "payload": {
                "payment_link": { "entity": { "id": "plink_7", "notes": { "invoice_number": "INV-1" } } },
                "payment": { "entity": { "id": "pay_2", "amount": 5000, "status": "captured", "notes": [] } }
            }
        }))
        .captured_payment()
        .unwrap();
        assert_eq!(lookup.link_ids, vec!["plink_7"]);
        assert_eq!(lookup.invoice_number.as_deref(), Some("INV-1"));
        assert_eq!(lookup.payment.method, "razorpay");
    }

    #[test]
    fn uncaptured_and_unrelated_events_are_ignored() {
        assert!(event(json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_3", "amount": 100, "status": "authorized" } } }
        }))
        .captured_payment()
        .is_none());
        assert!(event(json!({ "event": "refund.created", "payload": {} }))
            .captured_payment()
            .is_none());
    }

    async fn deliver(body: &'static str, signature: Option<String>) -> (StatusCode, Value) {
        let mut req = Request::post("/api/payments/razorpay/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            req = req.header(SIGNATURE_HEADER, sig);
        }
        let res = build_app(AppState::fake())
            .oneshot(req.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let body = r#"{"event":"payment.captured","payload":{}}"#;
        let (status, json) = deliver(body, Some(sign(body.as_bytes(), "wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid webhook signature");

        let (status, _) = deliver(body, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_unrelated_event_is_acknowledged() {
        let body = r#"{"event":"order.paid","payload":{}}"#;
        let secret = AppState::fake()
            .config
            .razorpay
            .webhook_secret
            .clone()
            .unwrap();
        let (status, json) = deliver(body, Some(sign(body.as_bytes(), &secret))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, json!({ "received": true }));
    }
}
