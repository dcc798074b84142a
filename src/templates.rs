//! HTML bodies for outgoing mail and for the PDF renderer.

use anyhow::Context as _;
use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};
use time::OffsetDateTime;

use crate::{
    config::CompanyConfig,
    invoices::repo_types::{iso_date, Invoice},
    payments::links::LinkPurpose,
};

const DEFAULT_PAYMENT_TERMS: &str = "Net 30";

lazy_static! {
    static ref TEMPLATES: Tera = {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("_base.html", include_str!("../templates/_base.html")),
            ("_items.html", include_str!("../templates/_items.html")),
            ("invoice_email.html", include_str!("../templates/invoice_email.html")),
            ("invoice_pdf.html", include_str!("../templates/invoice_pdf.html")),
            ("payment_link_email.html", include_str!("../templates/payment_link_email.html")),
            ("link_request_email.html", include_str!("../templates/link_request_email.html")),
        ])
        .expect("embedded templates must parse");
        tera
    };
}

fn money(v: Decimal) -> String {
    format!("{:.2}", v)
}

fn plain(v: Decimal) -> String {
    v.normalize().to_string()
}

#[derive(Serialize)]
struct ClientView<'a> {
    name: &'a str,
    email: &'a str,
    company: Option<&'a str>,
    address: Option<&'a str>,
    phone: Option<&'a str>,
}

#[derive(Serialize)]
struct ItemView<'a> {
    description: &'a str,
    quantity: String,
    unit_price: String,
    discount: String,
    total: String,
}

/// Invoice with every number pre-formatted for display.
#[derive(Serialize)]
struct InvoiceView<'a> {
    number: &'a str,
    client: ClientView<'a>,
    currency: &'a str,
    items: Vec<ItemView<'a>>,
    subtotal: String,
    discount: String,
    total: String,
    paid: String,
    balance: String,
    advance: String,
    issued_date: String,
    due_date: String,
    payment_terms: &'a str,
    status: &'static str,
    has_paid: bool,
    has_discount: bool,
    has_advance: bool,
}

impl<'a> From<&'a Invoice> for InvoiceView<'a> {
    fn from(inv: &'a Invoice) -> Self {
        Self {
            number: &inv.invoice_number,
            client: ClientView {
                name: &inv.client.name,
                email: &inv.client.email,
                company: inv.client.company.as_deref(),
                address: inv.client.address.as_deref(),
                phone: inv.client.phone.as_deref(),
            },
            currency: &inv.currency,
            items: inv
                .items
                .iter()
                .map(|i| ItemView {
                    description: &i.description,
                    quantity: plain(i.quantity),
                    unit_price: money(i.unit_price),
                    discount: plain(i.discount),
                    total: money(i.total),
                })
                .collect(),
            subtotal: money(inv.subtotal),
            discount: plain(inv.discount),
            total: money(inv.total),
            paid: money(inv.paid_amount),
            balance: money(inv.balance),
            advance: money(inv.advance_amount),
            issued_date: iso_date::format(&inv.issued_date),
            due_date: iso_date::format(&inv.due_date),
            payment_terms: inv.payment_terms.as_deref().unwrap_or(DEFAULT_PAYMENT_TERMS),
            status: inv.status.as_str(),
            has_paid: inv.paid_amount > Decimal::ZERO,
            has_discount: inv.discount > Decimal::ZERO,
            has_advance: inv.advance_amount > Decimal::ZERO,
        }
    }
}

fn base_context(company: &CompanyConfig, invoice: &Invoice) -> Context {
    let mut ctx = Context::new();
    ctx.insert("company", company);
    ctx.insert("year", &OffsetDateTime::now_utc().year());
    ctx.insert("invoice", &InvoiceView::from(invoice));
    ctx
}

fn render(name: &str, ctx: &Context) -> anyhow::Result<String> {
    TEMPLATES
        .render(name, ctx)
        .with_context(|| format!("render template {name}"))
}

pub fn invoice_email(company: &CompanyConfig, invoice: &Invoice) -> anyhow::Result<String> {
    render("invoice_email.html", &base_context(company, invoice))
}

pub fn invoice_pdf(company: &CompanyConfig, invoice: &Invoice) -> anyhow::Result<String> {
    render("invoice_pdf.html", &base_context(company, invoice))
}

/// Generic "pay this invoice" mail sent from the send-email endpoint.
pub fn payment_link_email(
    company: &CompanyConfig,
    invoice: &Invoice,
    payment_url: &str,
    amount: Decimal,
) -> anyhow::Result<String> {
    let mut ctx = base_context(company, invoice);
    ctx.insert("payment_url", payment_url);
    ctx.insert("amount", &money(amount));
    render("payment_link_email.html", &ctx)
}

/// Advance or remaining-balance request carrying a fresh gateway link.
pub fn link_request_email(
    company: &CompanyConfig,
    invoice: &Invoice,
    purpose: LinkPurpose,
    payment_url: &str,
    amount: Decimal,
) -> anyhow::Result<String> {
    let mut ctx = base_context(company, invoice);
    let (kind, heading) = match purpose {
        LinkPurpose::Advance => ("advance", "Advance payment request"),
        _ => ("remaining", "Remaining payment request"),
    };
    ctx.insert("kind", kind);
    ctx.insert("heading", heading);
    ctx.insert("payment_url", payment_url);
    ctx.insert("amount", &money(amount));
    ctx.insert(
        "remaining_after",
        &money((invoice.balance - amount).max(Decimal::ZERO)),
    );
    render("link_request_email.html", &ctx)
}
