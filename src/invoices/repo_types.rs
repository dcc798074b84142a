use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::{fmt, str::FromStr};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    AdvancePaid,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::AdvancePaid => "advance_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "advance_paid" => Ok(InvoiceStatus::AdvancePaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percent, 0..=100
    pub discount: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Advance,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub amount: Decimal,
    pub method: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub status: PaymentKind,
    pub transaction_id: String,
}

/// Client fields embedded in every invoice read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub client: ClientRef,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub balance: Decimal,
    pub status: InvoiceStatus,
    #[serde(with = "iso_date")]
    pub issued_date: Date,
    #[serde(with = "iso_date")]
    pub due_date: Date,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_date: Option<OffsetDateTime>,
    pub advance_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_link: Option<String>,
    pub payment_link_url: Option<String>,
    pub payment_history: Vec<PaymentEntry>,
    pub currency: String,
    pub payment_terms: Option<String>,
    pub original_invoice_id: Option<Uuid>,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Row shape of `invoices JOIN clients`.
#[derive(Debug, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub client_email: String,
    pub client_company: Option<String>,
    pub client_address: Option<String>,
    pub client_phone: Option<String>,
    pub items: Json<Vec<LineItem>>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub balance: Decimal,
    pub status: InvoiceStatus,
    pub issued_date: Date,
    pub due_date: Date,
    pub paid_date: Option<OffsetDateTime>,
    pub advance_amount: Decimal,
    pub paid_amount: Decimal,
    pub payment_link_id: Option<String>,
    pub payment_link_url: Option<String>,
    pub payment_history: Json<Vec<PaymentEntry>>,
    pub currency: String,
    pub payment_terms: Option<String>,
    pub original_invoice_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<InvoiceRow> for Invoice {
    fn from(r: InvoiceRow) -> Self {
        Self {
            id: r.id,
            invoice_number: r.invoice_number,
            client: ClientRef {
                id: r.client_id,
                name: r.client_name,
                email: r.client_email,
                company: r.client_company,
                address: r.client_address,
                phone: r.client_phone,
            },
            items: r.items.0,
            subtotal: r.subtotal,
            discount: r.discount,
            total: r.total,
            balance: r.balance,
            status: r.status,
            issued_date: r.issued_date,
            due_date: r.due_date,
            paid_date: r.paid_date,
            advance_amount: r.advance_amount,
            paid_amount: r.paid_amount,
            payment_link: r.payment_link_id,
            payment_link_url: r.payment_link_url,
            payment_history: r.payment_history.0,
            currency: r.currency,
            payment_terms: r.payment_terms,
            original_invoice_id: r.original_invoice_id,
            created_by: r.created_by,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Editable part of an invoice, shared by create and edit.
#[derive(Debug, Clone)]
pub struct InvoiceContents {
    pub client_id: Uuid,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub issued_date: Date,
    pub due_date: Date,
    pub advance_amount: Decimal,
    pub currency: String,
    pub payment_terms: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub contents: InvoiceContents,
    pub original_invoice_id: Option<Uuid>,
    pub created_by: Uuid,
}

/// Calendar dates as `YYYY-MM-DD`.
pub mod iso_date {
    use serde::Serializer;
    use time::{format_description::FormatItem, macros::format_description, Date};

    const FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

    pub fn format(date: &Date) -> String {
        // infallible for this format
        date.format(FORMAT).unwrap_or_default()
    }

    pub fn parse(s: &str) -> Result<Date, time::error::Parse> {
        // tolerate full timestamps from date pickers
        let day = s.get(..10).unwrap_or(s);
        Date::parse(day, FORMAT)
    }

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn status_strings_match_wire_format() {
        for s in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::AdvancePaid,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
        ] {
            assert_eq!(s.as_str().parse::<InvoiceStatus>(), Ok(s));
            assert_eq!(serde_json::to_value(s).unwrap(), s.as_str());
        }
        assert!("cancelled".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn iso_dates_accept_plain_and_timestamped_input() {
        assert_eq!(iso_date::parse("2025-03-09").unwrap(), date!(2025 - 03 - 09));
        assert_eq!(
            iso_date::parse("2025-03-09T00:00:00.000Z").unwrap(),
            date!(2025 - 03 - 09)
        );
        assert!(iso_date::parse("09/03/2025").is_err());
        assert_eq!(iso_date::format(&date!(2025 - 12 - 01)), "2025-12-01");
    }
}
