use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use super::{
    lifecycle::{round_money, ItemDraft},
    repo_types::{iso_date, Invoice},
};
use crate::clients::{dto::validate_details, repo_types::ClientDetails};

pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    #[serde(default)]
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub discount: Option<Decimal>,
}

/// Body of create, edit and remaining-balance requests.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    #[serde(default)]
    pub client_name: String,
    #[serde(default)]
    pub email: String,
    pub company: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub payment_terms: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
    pub discount: Option<Decimal>,
    pub advance_amount: Option<Decimal>,
    pub original_invoice_id: Option<Uuid>,
}

/// An [`InvoiceRequest`] that passed validation.
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
    pub client: ClientDetails,
    pub items: Vec<ItemDraft>,
    pub discount: Decimal,
    pub issued_date: Date,
    pub due_date: Date,
    pub advance_amount: Decimal,
    pub currency: String,
    pub payment_terms: Option<String>,
    pub invoice_number: Option<String>,
    pub original_invoice_id: Option<Uuid>,
}

fn valid_percent(p: Decimal) -> bool {
    p >= Decimal::ZERO && p <= Decimal::ONE_HUNDRED
}

impl ItemRequest {
    fn validate(self) -> Result<ItemDraft, &'static str> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err("Each item needs a description.");
        }
        let quantity = self.quantity.ok_or("Each item needs a quantity.")?;
        let unit_price = self.unit_price.ok_or("Each item needs a unit price.")?;
        if quantity <= Decimal::ZERO || unit_price < Decimal::ZERO {
            return Err("Item quantity must be positive and unit price non-negative.");
        }
        let discount = self.discount.unwrap_or_default();
        if !valid_percent(discount) {
            return Err("Discounts must be between 0 and 100.");
        }
        Ok(ItemDraft {
            description,
            quantity,
            unit_price,
            discount,
        })
    }
}

impl InvoiceRequest {
    /// `today` fills in a missing invoice date.
    pub fn validate(self, today: Date) -> Result<InvoiceDraft, &'static str> {
        if self.client_name.trim().is_empty() || self.email.trim().is_empty() || self.items.is_empty()
        {
            return Err("Missing required client or item fields.");
        }
        let client = validate_details(
            &self.client_name,
            &self.email,
            self.company,
            self.address,
            self.phone,
        )?;

        let items = self
            .items
            .into_iter()
            .map(ItemRequest::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let discount = self.discount.unwrap_or_default();
        if !valid_percent(discount) {
            return Err("Discounts must be between 0 and 100.");
        }

        let issued_date = match self.invoice_date.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => iso_date::parse(s.trim()).map_err(|_| "Invalid invoice date.")?,
            None => today,
        };
        let due_date = self
            .due_date
            .as_deref()
            .and_then(|s| iso_date::parse(s.trim()).ok())
            .ok_or("A valid due date is required.")?;
        if due_date < issued_date {
            return Err("Due date cannot be before the invoice date.");
        }

        let advance_amount = round_money(self.advance_amount.unwrap_or_default());
        if advance_amount < Decimal::ZERO {
            return Err("Advance amount cannot be negative.");
        }

        let currency = self
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(InvoiceDraft {
            client,
            items,
            discount,
            issued_date,
            due_date,
            advance_amount,
            currency,
            payment_terms: self
                .payment_terms
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            invoice_number: self.invoice_number,
            original_invoice_id: self.original_invoice_id,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentLinkRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub amount: Option<Decimal>,
}

impl PaymentLinkRequest {
    /// Requested amount at paisa precision.
    pub fn amount(&self) -> Option<Decimal> {
        self.amount.map(round_money)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceLinkRequest {
    #[serde(default)]
    pub invoice_number: String,
    pub advance_amount: Option<Decimal>,
}

impl AdvanceLinkRequest {
    pub fn advance_amount(&self) -> Option<Decimal> {
        self.advance_amount.map(round_money)
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceList {
    pub invoices: Vec<Invoice>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceEnvelope {
    pub invoice: Invoice,
}

#[derive(Debug, Serialize)]
pub struct InvoiceCreated {
    pub success: bool,
    pub invoice: Invoice,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct EmailSent {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSent {
    pub success: bool,
    pub payment_link: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCreated {
    pub payment_link: String,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn body(json: serde_json::Value) -> InvoiceRequest {
        serde_json::from_value(json).unwrap()
    }

    fn valid() -> serde_json::Value {
        serde_json::json!({
            "clientName": "Meera Rao",
            "email": "Meera@Example.com",
            "company": "Rao & Sons",
            "invoiceDate": "2025-03-01",
            "dueDate": "2025-03-31",
            "currency": "inr",
            "items": [
                { "description": "Logo", "quantity": 1, "unitPrice": 5000, "discount": 10 },
                { "description": "Cards", "quantity": 200, "unitPrice": 2.5 }
            ],
            "discount": 5,
            "advanceAmount": 1000
        })
    }

    #[test]
    fn valid_request_is_normalized() {
        let d = body(valid()).validate(date!(2025 - 03 - 05)).unwrap();
        assert_eq!(d.client.email, "meera@example.com");
        assert_eq!(d.items.len(), 2);
        assert_eq!(d.items[1].discount, Decimal::ZERO);
        assert_eq!(d.issued_date, date!(2025 - 03 - 01));
        assert_eq!(d.currency, "INR");
        assert_eq!(d.advance_amount, Decimal::from(1000));
    }

    #[test]
    fn missing_invoice_date_defaults_to_today() {
        let mut v = valid();
        v.as_object_mut().unwrap().remove("invoiceDate");
        let d = body(v).validate(date!(2025 - 03 - 05)).unwrap();
        assert_eq!(d.issued_date, date!(2025 - 03 - 05));
    }

    #[test]
    fn rejects_missing_client_or_items() {
        let today = date!(2025 - 03 - 05);
        let mut v = valid();
        v["items"] = serde_json::json!([]);
        assert_eq!(
            body(v).validate(today).unwrap_err(),
            "Missing required client or item fields."
        );
        let mut v = valid();
        v["clientName"] = serde_json::json!("  ");
        assert_eq!(
            body(v).validate(today).unwrap_err(),
            "Missing required client or item fields."
        );
    }

    #[test]
    fn rejects_bad_numbers_and_dates() {
        let today = date!(2025 - 03 - 05);
        let cases = [
            ("/items/0/quantity", serde_json::json!(0)),
            ("/items/0/unitPrice", serde_json::json!(-1)),
            ("/items/0/discount", serde_json::json!(120)),
            ("/discount", serde_json::json!(-5)),
            ("/dueDate", serde_json::json!("soon")),
            ("/dueDate", serde_json::json!("2025-02-01")),
            ("/advanceAmount", serde_json::json!(-10)),
        ];
        for (ptr, value) in cases {
            let mut v = valid();
            *v.pointer_mut(ptr).unwrap() = value;
            assert!(body(v).validate(today).is_err(), "{ptr} should be rejected");
        }
    }

    #[test]
    fn client_amounts_are_rounded_to_paisa() {
        let mut v = valid();
        v["advanceAmount"] = serde_json::json!(100.005);
        let d = body(v).validate(date!(2025 - 03 - 05)).unwrap();
        assert_eq!(d.advance_amount, "100.01".parse::<Decimal>().unwrap());

        let link: PaymentLinkRequest =
            serde_json::from_value(serde_json::json!({ "type": "advance", "amount": 100.005 }))
                .unwrap();
        assert_eq!(link.amount(), Some("100.01".parse().unwrap()));

        let adv: AdvanceLinkRequest = serde_json::from_value(
            serde_json::json!({ "invoiceNumber": "INV-1", "advanceAmount": 0.005 }),
        )
        .unwrap();
        assert_eq!(adv.advance_amount(), Some("0.01".parse().unwrap()));
    }
}
