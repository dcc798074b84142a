use anyhow::Context;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RazorpayConfig;

/// What a hosted payment link should collect.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub customer_name: String,
    pub customer_email: String,
    pub reference_id: String,
    pub invoice_number: String,
    /// `advance`, `remaining` or `full`; echoed back in webhook notes.
    pub purpose: &'static str,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedLink {
    pub id: String,
    pub short_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The reference id was used for an earlier link.
    #[error("duplicate reference: {0}")]
    DuplicateReference(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl GatewayError {
    /// Map a gateway error description onto our variants.
    pub fn from_description(description: String) -> Self {
        if description.contains("already exists") {
            GatewayError::DuplicateReference(description)
        } else {
            GatewayError::Rejected(description)
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_link(&self, req: &LinkRequest) -> Result<CreatedLink, GatewayError>;
}

/// Amounts travel in the smallest currency unit (paise for INR).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Razorpay Payment Links over its REST API.
pub struct RazorpayGateway {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    endpoint: String,
    callback_url: String,
}

impl RazorpayGateway {
    pub fn new(http: reqwest::Client, cfg: &RazorpayConfig) -> Self {
        Self {
            http,
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
            endpoint: format!("{}/payment_links", cfg.api_base.trim_end_matches('/')),
            callback_url: cfg.callback_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct Customer<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct Notify {
    email: bool,
    sms: bool,
}

#[derive(Serialize)]
struct Notes<'a> {
    invoice_number: &'a str,
    #[serde(rename = "type")]
    purpose: &'a str,
}

#[derive(Serialize)]
struct CreateLinkBody<'a> {
    amount: i64,
    currency: &'a str,
    accept_partial: bool,
    description: &'a str,
    customer: Customer<'a>,
    notify: Notify,
    reference_id: &'a str,
    callback_url: &'a str,
    callback_method: &'a str,
    notes: Notes<'a>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: String,
}

#[async_trait::async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_link(&self, req: &LinkRequest) -> Result<CreatedLink, GatewayError> {
        let amount = to_minor_units(req.amount)
            .ok_or_else(|| GatewayError::Rejected(format!("amount out of range: {}", req.amount)))?;
        let body = CreateLinkBody {
            amount,
            currency: &req.currency,
            accept_partial: false,
            description: &req.description,
            customer: Customer {
                name: &req.customer_name,
                email: &req.customer_email,
            },
            notify: Notify {
                email: true,
                sms: false,
            },
            reference_id: &req.reference_id,
            callback_url: &self.callback_url,
            callback_method: "get",
            notes: Notes {
                invoice_number: &req.invoice_number,
                purpose: req.purpose,
            },
        };

        let res = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .context("razorpay request")?;

        if !res.status().is_success() {
            let status = res.status();
            let raw = res.text().await.unwrap_or_default();
            let description = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|e| e.error.description)
                .unwrap_or_else(|_| format!("{}: {}", status, raw));
            return Err(GatewayError::from_description(description));
        }

        let link: CreatedLink = res.json().await.context("razorpay response body")?;
        debug!(link_id = %link.id, reference_id = %req.reference_id, "payment link created");
        Ok(link)
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::{collections::VecDeque, sync::Mutex};

    /// Hands out links `plink_1`, `plink_2`, ... unless a scripted result is
    /// queued. Every request is kept for inspection.
    #[derive(Default)]
    pub struct FakeGateway {
        pub requests: Mutex<Vec<LinkRequest>>,
        pub scripted: Mutex<VecDeque<Result<CreatedLink, GatewayError>>>,
    }

    impl FakeGateway {
        pub fn push(&self, result: Result<CreatedLink, GatewayError>) {
            self.scripted.lock().unwrap().push_back(result);
        }

        pub fn references(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.reference_id.clone())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_link(&self, req: &LinkRequest) -> Result<CreatedLink, GatewayError> {
            let n = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(req.clone());
                requests.len()
            };
            match self.scripted.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(CreatedLink {
                    id: format!("plink_{n}"),
                    short_url: format!("https://rzp.io/i/{n}"),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_units_round_to_nearest_paisa() {
        assert_eq!(to_minor_units("1234.5".parse().unwrap()), Some(123450));
        assert_eq!(to_minor_units("0.005".parse().unwrap()), Some(1));
        assert_eq!(to_minor_units("0.015".parse().unwrap()), Some(2));
        assert_eq!(to_minor_units("100.005".parse().unwrap()), Some(10001));
        assert_eq!(to_minor_units(Decimal::ZERO), Some(0));
    }

    #[test]
    fn duplicate_reference_is_recognized_from_description() {
        assert!(matches!(
            GatewayError::from_description("reference_id already exists".into()),
            GatewayError::DuplicateReference(_)
        ));
        assert!(matches!(
            GatewayError::from_description("The amount must be atleast INR 1.00".into()),
            GatewayError::Rejected(_)
        ));
    }

    #[test]
    fn link_body_matches_gateway_contract() {
        let body = CreateLinkBody {
            amount: 50000,
            currency: "INR",
            accept_partial: false,
            description: "Advance for Invoice #INV-1",
            customer: Customer {
                name: "Meera",
                email: "meera@example.com",
            },
            notify: Notify {
                email: true,
                sms: false,
            },
            reference_id: "invoice_INV-1_advance",
            callback_url: "https://example.com/paid",
            callback_method: "get",
            notes: Notes {
                invoice_number: "INV-1",
                purpose: "advance",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["amount"], 50000);
        assert_eq!(json["notes"]["type"], "advance");
        assert_eq!(json["notify"]["sms"], false);
        assert_eq!(json["customer"]["email"], "meera@example.com");
    }
}
