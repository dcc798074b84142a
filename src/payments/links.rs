use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::gateway::{CreatedLink, GatewayError, LinkRequest, PaymentGateway};
use crate::{
    auth::services::is_valid_email,
    error::{ApiError, ApiResult},
    invoices::{repo, repo_types::Invoice},
    mailer::OutgoingEmail,
    state::AppState,
    templates,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPurpose {
    Advance,
    Remaining,
    Full,
}

impl LinkPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPurpose::Advance => "advance",
            LinkPurpose::Remaining => "remaining",
            LinkPurpose::Full => "full",
        }
    }

    fn description(&self, number: &str) -> String {
        match self {
            LinkPurpose::Advance => format!("Advance for Invoice #{number}"),
            LinkPurpose::Remaining => format!("Remaining payment for Invoice #{number}"),
            LinkPurpose::Full => format!("Payment for Invoice #{number}"),
        }
    }

    fn subject(&self, number: &str) -> String {
        match self {
            LinkPurpose::Advance => format!("Advance Payment Request for Invoice #{number}"),
            _ => format!("Remaining Payment Request for Invoice #{number}"),
        }
    }
}

pub fn reference_id(invoice_number: &str, purpose: LinkPurpose) -> String {
    format!("invoice_{}_{}", invoice_number, purpose.as_str())
}

fn gateway_failure(err: GatewayError) -> ApiError {
    ApiError::internal(err, "RAZORPAY_ERROR", "Failed to create payment link")
}

/// Create a hosted link for `amount`. A reference the gateway has already
/// seen is retried once with a millisecond suffix.
#[instrument(skip(gateway, invoice), fields(invoice = %invoice.invoice_number))]
pub async fn issue(
    gateway: &dyn PaymentGateway,
    invoice: &Invoice,
    purpose: LinkPurpose,
    amount: Decimal,
) -> ApiResult<CreatedLink> {
    let mut req = LinkRequest {
        amount,
        currency: invoice.currency.clone(),
        description: purpose.description(&invoice.invoice_number),
        customer_name: invoice.client.name.clone(),
        customer_email: invoice.client.email.clone(),
        reference_id: reference_id(&invoice.invoice_number, purpose),
        invoice_number: invoice.invoice_number.clone(),
        purpose: purpose.as_str(),
    };

    match gateway.create_link(&req).await {
        Ok(link) => Ok(link),
        Err(GatewayError::DuplicateReference(reason)) => {
            let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
            req.reference_id = format!("{}_{}", req.reference_id, millis);
            warn!(%reason, reference_id = %req.reference_id, "reference taken, retrying");
            gateway.create_link(&req).await.map_err(gateway_failure)
        }
        Err(e) => Err(gateway_failure(e)),
    }
}

/// Issue a link, remember it on the invoice and mail it to the client.
/// Returns the short URL.
pub async fn send_link(
    state: &AppState,
    invoice: &Invoice,
    purpose: LinkPurpose,
    amount: Decimal,
) -> ApiResult<String> {
    if !is_valid_email(&invoice.client.email) {
        warn!(invoice = %invoice.invoice_number, "client email unusable for payment link");
        return Err(ApiError::rejected(
            "INVALID_EMAIL",
            "Invalid or missing client email address.",
        ));
    }

    let link = issue(state.gateway.as_ref(), invoice, purpose, amount).await?;
    let advance = (purpose == LinkPurpose::Advance).then_some(amount);
    repo::set_payment_link(&state.db, invoice.id, &link.id, Some(&link.short_url), advance).await?;

    let html = templates::link_request_email(
        &state.config.company,
        invoice,
        purpose,
        &link.short_url,
        amount,
    )?;
    state
        .mailer
        .send(OutgoingEmail {
            to: invoice.client.email.clone(),
            subject: purpose.subject(&invoice.invoice_number),
            html,
            attachment: None,
        })
        .await?;

    info!(
        invoice = %invoice.invoice_number,
        link_id = %link.id,
        purpose = purpose.as_str(),
        %amount,
        "payment link sent"
    );
    Ok(link.short_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{invoices::lifecycle::test_support::invoice, payments::gateway::fake::FakeGateway};

    #[test]
    fn references_name_invoice_and_purpose() {
        assert_eq!(
            reference_id("INV-20250101-1234", LinkPurpose::Remaining),
            "invoice_INV-20250101-1234_remaining"
        );
    }

    #[tokio::test]
    async fn first_attempt_uses_plain_reference() {
        let gw = FakeGateway::default();
        let inv = invoice(Decimal::from(1000));
        let link = issue(&gw, &inv, LinkPurpose::Advance, Decimal::from(200))
            .await
            .unwrap();
        assert_eq!(link.id, "plink_1");
        assert_eq!(gw.references(), vec!["invoice_INV-20250101-1234_advance"]);
        let sent = gw.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.amount, Decimal::from(200));
        assert_eq!(sent.description, "Advance for Invoice #INV-20250101-1234");
        assert_eq!(sent.customer_email, "meera@example.com");
    }

    #[tokio::test]
    async fn duplicate_reference_retries_once_with_suffix() {
        let gw = FakeGateway::default();
        gw.push(Err(GatewayError::DuplicateReference(
            "reference_id already exists".into(),
        )));
        let inv = invoice(Decimal::from(1000));
        let link = issue(&gw, &inv, LinkPurpose::Remaining, Decimal::from(800))
            .await
            .unwrap();
        assert_eq!(link.id, "plink_2");
        let refs = gw.references();
        assert_eq!(refs.len(), 2);
        let suffix = refs[1]
            .strip_prefix("invoice_INV-20250101-1234_remaining_")
            .unwrap();
        assert!(suffix.parse::<i128>().is_ok());
    }

    #[tokio::test]
    async fn second_duplicate_is_not_retried_again() {
        let gw = FakeGateway::default();
        for _ in 0..2 {
            gw.push(Err(GatewayError::DuplicateReference("already exists".into())));
        }
        let inv = invoice(Decimal::from(1000));
        let err = issue(&gw, &inv, LinkPurpose::Remaining, Decimal::from(800))
            .await
            .unwrap_err();
        assert_eq!(gw.references().len(), 2);
        assert_eq!(err.body().code, Some("RAZORPAY_ERROR"));
    }

    #[tokio::test]
    async fn other_gateway_errors_surface_as_coded_500() {
        let gw = FakeGateway::default();
        gw.push(Err(GatewayError::Rejected("bad amount".into())));
        let inv = invoice(Decimal::from(1000));
        let err = issue(&gw, &inv, LinkPurpose::Full, Decimal::from(1000))
            .await
            .unwrap_err();
        assert_eq!(gw.references().len(), 1);
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.body();
        assert_eq!(body.code, Some("RAZORPAY_ERROR"));
        assert!(body.reference.is_some());
    }
}
