use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AdvanceLinkRequest, EmailSent, InvoiceCreated, InvoiceEnvelope, InvoiceList,
        InvoiceRequest, LinkCreated, LinkSent, PaymentLinkRequest, SendEmailRequest,
        StatusRequest, Success,
    },
    lifecycle::{effective_status, minimum_advance},
    repo,
    repo_types::{Invoice, InvoiceStatus},
    services::{self, today},
};
use crate::{
    auth::services::AuthUser,
    error::{ApiError, ApiResult},
    payments::links::{issue, send_link, LinkPurpose},
    state::AppState,
};

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/remaining", post(create_remaining_invoice))
        .route("/invoices/send-advance-link", post(send_advance_link))
        .route(
            "/invoices/:id",
            get(get_invoice)
                .put(update_invoice)
                .delete(delete_invoice)
                .post(create_payment_link),
        )
        .route("/invoices/:id/status", post(set_status))
        .route("/invoices/:id/send-email", post(send_email))
        .route("/invoices/:id/pdf", get(download_pdf))
        .route("/invoices/:id/send-remaining-link", post(send_remaining_link))
}

async fn load(state: &AppState, id: Uuid) -> ApiResult<Invoice> {
    repo::find_by_id(&state.db, id).await?.ok_or_else(|| {
        warn!(invoice_id = %id, "invoice not found");
        ApiError::not_found("Invoice not found")
    })
}

#[instrument(skip(state))]
pub async fn list_invoices(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> ApiResult<Json<InvoiceList>> {
    let today = today();
    let flipped = repo::mark_overdue(&state.db, today).await?;
    if flipped > 0 {
        info!(count = flipped, "invoices marked overdue");
    }
    let mut invoices = repo::list(&state.db).await?;
    // rows written between the sweep and the read
    for inv in &mut invoices {
        inv.status = effective_status(inv.status, inv.due_date, today);
    }
    Ok(Json(InvoiceList { invoices }))
}

#[instrument(skip(state, payload))]
pub async fn create_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<InvoiceRequest>,
) -> ApiResult<Json<InvoiceCreated>> {
    let draft = payload.validate(today()).map_err(ApiError::bad_request)?;
    let invoice = services::create(&state, auth.user_id, draft).await?;
    Ok(Json(InvoiceCreated {
        success: true,
        invoice,
        message: "Invoice created successfully",
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_remaining_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<InvoiceRequest>,
) -> ApiResult<Json<InvoiceCreated>> {
    let draft = payload.validate(today()).map_err(ApiError::bad_request)?;
    let Some(original_id) = draft.original_invoice_id else {
        return Err(ApiError::bad_request("originalInvoiceId is required."));
    };
    if repo::find_by_id(&state.db, original_id).await?.is_none() {
        return Err(ApiError::not_found("Original invoice not found"));
    }
    let invoice = services::create(&state, auth.user_id, draft).await?;
    info!(invoice_id = %invoice.id, original = %original_id, "remaining invoice created");
    Ok(Json(InvoiceCreated {
        success: true,
        invoice,
        message: "Remaining invoice created successfully",
    }))
}

#[instrument(skip(state))]
pub async fn get_invoice(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<InvoiceEnvelope>> {
    let invoice = load(&state, id).await?;
    Ok(Json(InvoiceEnvelope { invoice }))
}

#[instrument(skip(state, payload))]
pub async fn update_invoice(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<InvoiceRequest>,
) -> ApiResult<Json<InvoiceEnvelope>> {
    let draft = payload.validate(today()).map_err(ApiError::bad_request)?;
    let invoice = services::update(&state, auth.user_id, id, draft).await?;
    Ok(Json(InvoiceEnvelope { invoice }))
}

#[instrument(skip(state))]
pub async fn delete_invoice(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Success>> {
    if !repo::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Invoice not found"));
    }
    info!(invoice_id = %id, "invoice deleted");
    Ok(Json(Success { success: true }))
}

/// Link for the client-side checkout; nothing is mailed.
#[instrument(skip(state, payload))]
pub async fn create_payment_link(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentLinkRequest>,
) -> ApiResult<Json<LinkCreated>> {
    let purpose = match payload.kind.as_str() {
        "advance" => LinkPurpose::Advance,
        "full" => LinkPurpose::Full,
        _ => return Err(ApiError::bad_request("Invalid payment type.")),
    };
    let invoice = load(&state, id).await?;
    if invoice.balance <= Decimal::ZERO {
        return Err(ApiError::bad_request("Invoice is already fully paid"));
    }

    let amount = match purpose {
        LinkPurpose::Advance => {
            let min = minimum_advance(invoice.total);
            payload
                .amount()
                .filter(|a| *a >= min)
                .unwrap_or(min)
                .min(invoice.balance)
        }
        _ => invoice.balance,
    };

    let link = issue(state.gateway.as_ref(), &invoice, purpose, amount).await?;
    let advance = (purpose == LinkPurpose::Advance).then_some(amount);
    repo::set_payment_link(&state.db, id, &link.id, Some(&link.short_url), advance).await?;

    info!(invoice_id = %id, link_id = %link.id, %amount, "payment link created");
    Ok(Json(LinkCreated {
        payment_link: link.id,
        amount,
    }))
}

#[instrument(skip(state, payload))]
pub async fn set_status(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> ApiResult<Json<Success>> {
    let status: InvoiceStatus = payload
        .status
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid status value."))?;
    if !repo::set_status(&state.db, id, status).await? {
        return Err(ApiError::not_found("Invoice not found"));
    }
    info!(invoice_id = %id, %status, "invoice status set");
    Ok(Json(Success { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn send_email(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendEmailRequest>,
) -> ApiResult<Json<EmailSent>> {
    let kind = payload.kind.as_str();
    if kind != "invoice" && kind != "payment" {
        return Err(ApiError::bad_request("Invalid email type."));
    }
    let invoice = load(&state, id).await?;
    if kind == "invoice" {
        services::email_invoice(&state, &invoice).await?;
    } else {
        services::email_payment_link(&state, &invoice).await?;
    }
    info!(invoice_id = %id, kind, to = %invoice.client.email, "invoice email sent");
    Ok(Json(EmailSent {
        success: true,
        message: format!("Email sent successfully to {}", invoice.client.email),
    }))
}

#[instrument(skip(state))]
pub async fn download_pdf(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let invoice = load(&state, id).await?;
    let pdf = services::render_pdf(&state, &invoice).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", services::pdf_filename(&invoice)),
            ),
        ],
        pdf,
    ))
}

#[instrument(skip(state, payload))]
pub async fn send_advance_link(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<AdvanceLinkRequest>,
) -> ApiResult<Json<LinkSent>> {
    let number = payload.invoice_number.trim();
    if number.is_empty() {
        return Err(ApiError::bad_request("invoiceNumber is required."));
    }
    let invoice = repo::find_by_number(&state.db, number)
        .await?
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

    let amount = payload.advance_amount().unwrap_or(invoice.advance_amount);
    if amount <= Decimal::ZERO || amount > invoice.balance {
        warn!(invoice = %number, %amount, balance = %invoice.balance, "bad advance amount");
        return Err(ApiError::bad_request(
            "Advance amount must be greater than zero and not exceed the balance.",
        ));
    }

    let payment_link = send_link(&state, &invoice, LinkPurpose::Advance, amount).await?;
    Ok(Json(LinkSent {
        success: true,
        payment_link,
    }))
}

#[instrument(skip(state))]
pub async fn send_remaining_link(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LinkSent>> {
    let invoice = load(&state, id).await?;
    if invoice.balance <= Decimal::ZERO {
        return Err(ApiError::bad_request("Invoice is already fully paid"));
    }
    let payment_link = send_link(&state, &invoice, LinkPurpose::Remaining, invoice.balance).await?;
    Ok(Json(LinkSent {
        success: true,
        payment_link,
    }))
}
