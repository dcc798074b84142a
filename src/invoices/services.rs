use anyhow::anyhow;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::InvoiceDraft,
    lifecycle::{balance, compute_totals},
    numbering, repo,
    repo_types::{Invoice, InvoiceContents, NewInvoice},
};
use crate::{
    clients::repo::upsert_by_email,
    error::{ApiError, ApiResult},
    mailer::{Attachment, OutgoingEmail},
    payments::links::{send_link, LinkPurpose},
    state::AppState,
    templates,
};

pub fn today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

/// Totals are always recomputed here; whatever the client sent is ignored.
fn contents_from(draft: &InvoiceDraft, client_id: Uuid) -> InvoiceContents {
    let totals = compute_totals(draft.items.clone(), draft.discount);
    InvoiceContents {
        client_id,
        items: totals.items,
        subtotal: totals.subtotal,
        discount: draft.discount,
        total: totals.total,
        issued_date: draft.issued_date,
        due_date: draft.due_date,
        advance_amount: draft.advance_amount,
        currency: draft.currency.clone(),
        payment_terms: draft.payment_terms.clone(),
    }
}

/// Checks that need the computed total but not the database.
pub fn check_amounts(draft: &InvoiceDraft) -> ApiResult<Decimal> {
    let total = compute_totals(draft.items.clone(), draft.discount).total;
    if draft.advance_amount > total {
        return Err(ApiError::bad_request(
            "Advance amount cannot exceed the invoice total.",
        ));
    }
    Ok(total)
}

/// Where a numbered invoice row goes. `None` means the number is taken.
#[async_trait::async_trait]
pub trait InvoiceSink: Send {
    async fn insert_invoice(&mut self, new: &NewInvoice) -> anyhow::Result<Option<Uuid>>;
}

#[async_trait::async_trait]
impl InvoiceSink for sqlx::PgConnection {
    async fn insert_invoice(&mut self, new: &NewInvoice) -> anyhow::Result<Option<Uuid>> {
        repo::insert(self, new).await
    }
}

/// Try each candidate number in turn until one is free.
pub async fn insert_numbered<S: InvoiceSink + ?Sized>(
    sink: &mut S,
    numbers: Vec<String>,
    mut new: NewInvoice,
) -> ApiResult<Uuid> {
    for number in numbers {
        new.invoice_number = number;
        match sink.insert_invoice(&new).await? {
            Some(id) => return Ok(id),
            None => warn!(number = %new.invoice_number, "invoice number taken, retrying"),
        }
    }
    Err(ApiError::internal(
        anyhow!("{} invoice numbers collided", numbering::MAX_ATTEMPTS),
        "INVOICE_NUMBER_EXHAUSTED",
        "Could not generate a unique invoice number",
    ))
}

/// Upsert the client and insert the invoice in one transaction, trying a
/// fresh number whenever the current one is taken.
pub async fn create(state: &AppState, user_id: Uuid, draft: InvoiceDraft) -> ApiResult<Invoice> {
    check_amounts(&draft)?;
    let numbers = numbering::candidates(draft.invoice_number.as_deref(), today());

    let mut tx = state.db.begin().await?;
    let client = upsert_by_email(&mut *tx, &draft.client, user_id).await?;
    let new = NewInvoice {
        invoice_number: String::new(),
        contents: contents_from(&draft, client.id),
        original_invoice_id: draft.original_invoice_id,
        created_by: user_id,
    };
    let id = insert_numbered(&mut *tx, numbers, new).await?;

    let invoice = repo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| anyhow!("invoice {id} vanished after insert"))?;
    tx.commit().await?;

    info!(
        invoice_id = %invoice.id,
        number = %invoice.invoice_number,
        client = %invoice.client.email,
        total = %invoice.total,
        "invoice created"
    );
    Ok(invoice)
}

/// Replace the editable contents. Number, status and payments stay put.
pub async fn update(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    draft: InvoiceDraft,
) -> ApiResult<Invoice> {
    let total = check_amounts(&draft)?;

    let mut tx = state.db.begin().await?;
    let current = repo::lock_by_id(&mut tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;
    if total < current.paid_amount {
        warn!(invoice_id = %id, %total, paid = %current.paid_amount, "edit below paid amount");
        return Err(ApiError::bad_request(
            "Invoice total cannot be less than the amount already paid.",
        ));
    }

    let client = upsert_by_email(&mut *tx, &draft.client, user_id).await?;
    let contents = contents_from(&draft, client.id);
    repo::update_contents(
        &mut *tx,
        id,
        &contents,
        balance(contents.total, current.paid_amount),
    )
    .await?;
    let invoice = repo::find_by_id(&mut *tx, id)
        .await?
        .ok_or_else(|| anyhow!("invoice {id} vanished during update"))?;
    tx.commit().await?;

    info!(invoice_id = %id, total = %invoice.total, "invoice updated");
    Ok(invoice)
}

pub async fn render_pdf(state: &AppState, invoice: &Invoice) -> ApiResult<Vec<u8>> {
    let html = templates::invoice_pdf(&state.config.company, invoice)?;
    state
        .pdf
        .render(html)
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e), "PDF_ERROR", "Failed to generate PDF"))
}

pub fn pdf_filename(invoice: &Invoice) -> String {
    format!("Invoice-{}.pdf", invoice.invoice_number)
}

/// Invoice summary mail with the PDF attached.
pub async fn email_invoice(state: &AppState, invoice: &Invoice) -> ApiResult<()> {
    let html = templates::invoice_email(&state.config.company, invoice)?;
    let pdf = render_pdf(state, invoice).await?;
    state
        .mailer
        .send(OutgoingEmail {
            to: invoice.client.email.clone(),
            subject: format!(
                "Invoice #{} from {}",
                invoice.invoice_number, state.config.company.name
            ),
            html,
            attachment: Some(Attachment {
                filename: pdf_filename(invoice),
                content_type: "application/pdf".into(),
                body: pdf,
            }),
        })
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e), "EMAIL_ERROR", "Failed to send email"))
}

/// Mail the stored payment link, or issue a remaining-balance link when the
/// invoice has none yet.
pub async fn email_payment_link(state: &AppState, invoice: &Invoice) -> ApiResult<()> {
    if invoice.balance <= Decimal::ZERO {
        return Err(ApiError::bad_request("Invoice is already fully paid"));
    }
    let Some(url) = invoice.payment_link_url.as_deref() else {
        send_link(state, invoice, LinkPurpose::Remaining, invoice.balance).await?;
        return Ok(());
    };

    let html = templates::payment_link_email(&state.config.company, invoice, url, invoice.balance)?;
    state
        .mailer
        .send(OutgoingEmail {
            to: invoice.client.email.clone(),
            subject: format!("Payment Link for Invoice #{}", invoice.invoice_number),
            html,
            attachment: None,
        })
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e), "EMAIL_ERROR", "Failed to send email"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clients::repo_types::ClientDetails,
        invoices::{lifecycle::test_support::invoice, lifecycle::ItemDraft},
        mailer::fake::RecordingMailer,
    };
    use std::sync::Arc;
    use time::macros::date;

    fn draft(advance: i64) -> InvoiceDraft {
        InvoiceDraft {
            client: ClientDetails {
                name: "Meera".into(),
                email: "meera@example.com".into(),
                company: None,
                address: None,
                phone: None,
            },
            items: vec![ItemDraft {
                description: "Site".into(),
                quantity: Decimal::from(2),
                unit_price: Decimal::from(500),
                discount: Decimal::ZERO,
            }],
            discount: Decimal::from(10),
            issued_date: date!(2025 - 01 - 01),
            due_date: date!(2025 - 01 - 31),
            advance_amount: Decimal::from(advance),
            currency: "INR".into(),
            payment_terms: None,
            invoice_number: None,
            original_invoice_id: None,
        }
    }

    #[test]
    fn advance_above_total_is_rejected() {
        assert_eq!(check_amounts(&draft(900)).unwrap(), Decimal::from(900));
        let err = check_amounts(&draft(901)).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn contents_carry_computed_totals() {
        let c = contents_from(&draft(0), Uuid::nil());
        assert_eq!(c.subtotal, Decimal::from(1000));
        assert_eq!(c.total, Decimal::from(900));
        assert_eq!(c.items[0].total, Decimal::from(1000));
    }

    /// Reports the first `taken` numbers as already used.
    struct Collisions {
        taken: usize,
        tried: Vec<String>,
    }

    #[async_trait::async_trait]
    impl InvoiceSink for Collisions {
        async fn insert_invoice(&mut self, new: &NewInvoice) -> anyhow::Result<Option<Uuid>> {
            self.tried.push(new.invoice_number.clone());
            Ok((self.tried.len() > self.taken).then(Uuid::new_v4))
        }
    }

    fn new_invoice() -> NewInvoice {
        NewInvoice {
            invoice_number: String::new(),
            contents: contents_from(&draft(0), Uuid::nil()),
            original_invoice_id: None,
            created_by: Uuid::nil(),
        }
    }

    #[tokio::test]
    async fn taken_numbers_are_retried() {
        let numbers = numbering::candidates(Some("INV-CUSTOM"), date!(2025 - 01 - 01));
        let mut sink = Collisions { taken: 2, tried: vec![] };

        insert_numbered(&mut sink, numbers.clone(), new_invoice()).await.unwrap();

        assert_eq!(sink.tried, numbers[..3].to_vec());
        assert_eq!(sink.tried[0], "INV-CUSTOM");
    }

    #[tokio::test]
    async fn five_collisions_give_up_with_500() {
        let numbers = numbering::candidates(None, date!(2025 - 01 - 01));
        let mut sink = Collisions { taken: usize::MAX, tried: vec![] };

        let err = insert_numbered(&mut sink, numbers, new_invoice()).await.unwrap_err();

        assert_eq!(sink.tried.len(), numbering::MAX_ATTEMPTS);
        assert_eq!(err.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(err, ApiError::Internal { code: "INVOICE_NUMBER_EXHAUSTED", .. }));
        assert!(err.to_string().starts_with("Could not generate a unique invoice number"));
    }

    #[tokio::test]
    async fn invoice_email_attaches_pdf() {
        let mailer = Arc::new(RecordingMailer::default());
        let mut state = AppState::fake();
        state.mailer = mailer.clone();
        let inv = invoice(Decimal::from(1000));

        email_invoice(&state, &inv).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "meera@example.com");
        assert!(sent[0].subject.starts_with("Invoice #INV-20250101-1234 from "));
        let att = sent[0].attachment.as_ref().unwrap();
        assert_eq!(att.filename, "Invoice-INV-20250101-1234.pdf");
        assert!(att.body.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn stored_payment_link_is_reused() {
        let mailer = Arc::new(RecordingMailer::default());
        let mut state = AppState::fake();
        state.mailer = mailer.clone();
        let mut inv = invoice(Decimal::from(1000));
        inv.payment_link_url = Some("https://rzp.io/i/stored".into());

        email_payment_link(&state, &inv).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "Payment Link for Invoice #INV-20250101-1234");
        assert!(sent[0].html.contains("https://rzp.io/i/stored"));
    }

    #[tokio::test]
    async fn paid_invoice_gets_no_payment_mail() {
        let state = AppState::fake();
        let mut inv = invoice(Decimal::from(1000));
        inv.balance = Decimal::ZERO;
        let err = email_payment_link(&state, &inv).await.unwrap_err();
        assert_eq!(err.to_string(), "Invoice is already fully paid");
    }
}
