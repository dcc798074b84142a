//! Money and status rules for invoices. Everything here is pure so the
//! handlers, the webhook and the tests share one definition.

use rust_decimal::{Decimal, RoundingStrategy};
use time::{Date, OffsetDateTime};

use super::repo_types::{Invoice, InvoiceStatus, LineItem, PaymentEntry, PaymentKind};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Line item as entered, before its total is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Totals {
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub total: Decimal,
}

pub fn round_money(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn after_discount(amount: Decimal, percent: Decimal) -> Decimal {
    amount * (HUNDRED - percent) / HUNDRED
}

pub fn line_total(quantity: Decimal, unit_price: Decimal, discount: Decimal) -> Decimal {
    round_money(after_discount(quantity * unit_price, discount))
}

pub fn compute_totals(drafts: Vec<ItemDraft>, discount: Decimal) -> Totals {
    let items: Vec<LineItem> = drafts
        .into_iter()
        .map(|d| LineItem {
            total: line_total(d.quantity, d.unit_price, d.discount),
            description: d.description,
            quantity: d.quantity,
            unit_price: d.unit_price,
            discount: d.discount,
        })
        .collect();
    let subtotal: Decimal = items.iter().map(|i| i.total).sum();
    Totals {
        total: round_money(after_discount(subtotal, discount)),
        subtotal,
        items,
    }
}

pub fn balance(total: Decimal, paid: Decimal) -> Decimal {
    (total - paid).max(Decimal::ZERO)
}

/// Smallest advance a payment link may ask for: 20% of the total, rounded up
/// to a whole unit.
pub fn minimum_advance(total: Decimal) -> Decimal {
    (total * Decimal::new(2, 1)).ceil()
}

/// Status an invoice should show on `today`.
pub fn effective_status(status: InvoiceStatus, due_date: Date, today: Date) -> InvoiceStatus {
    match status {
        InvoiceStatus::Paid | InvoiceStatus::Overdue => status,
        _ if due_date < today => InvoiceStatus::Overdue,
        _ => status,
    }
}

#[derive(Debug, Clone)]
pub struct CapturedPayment {
    pub amount: Decimal,
    pub method: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Applied(PaymentKind),
    Duplicate,
}

/// Record a captured payment on the invoice. A transaction id that is
/// already in the history leaves the invoice untouched.
pub fn apply_payment(
    invoice: &mut Invoice,
    payment: CapturedPayment,
    now: OffsetDateTime,
) -> PaymentOutcome {
    if invoice
        .payment_history
        .iter()
        .any(|p| p.transaction_id == payment.transaction_id)
    {
        return PaymentOutcome::Duplicate;
    }

    let kind = if payment.amount < invoice.total {
        PaymentKind::Advance
    } else {
        PaymentKind::Full
    };

    invoice.paid_amount += payment.amount;
    invoice.payment_history.push(PaymentEntry {
        amount: payment.amount,
        method: payment.method,
        date: now,
        status: kind,
        transaction_id: payment.transaction_id,
    });

    if kind == PaymentKind::Advance {
        invoice.status = InvoiceStatus::AdvancePaid;
    }
    if invoice.paid_amount >= invoice.total {
        invoice.status = InvoiceStatus::Paid;
        invoice.paid_date = Some(now);
    }
    invoice.balance = balance(invoice.total, invoice.paid_amount);

    PaymentOutcome::Applied(kind)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::invoices::repo_types::ClientRef;
    use time::macros::date;
    use uuid::Uuid;

    pub fn invoice(total: Decimal) -> Invoice {
        let now = OffsetDateTime::now_utc();
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-20250101-1234".into(),
            client: ClientRef {
                id: Uuid::new_v4(),
                name: "Meera Rao".into(),
                email: "meera@example.com".into(),
                company: Some("Rao & Sons".into()),
                address: None,
                phone: None,
            },
            items: vec![LineItem {
                description: "Logo design".into(),
                quantity: Decimal::ONE,
                unit_price: total,
                discount: Decimal::ZERO,
                total,
            }],
            subtotal: total,
            discount: Decimal::ZERO,
            total,
            balance: total,
            status: InvoiceStatus::Sent,
            issued_date: date!(2025 - 01 - 01),
            due_date: date!(2025 - 01 - 31),
            paid_date: None,
            advance_amount: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            payment_link: None,
            payment_link_url: None,
            payment_history: vec![],
            currency: "INR".into(),
            payment_terms: None,
            original_invoice_id: None,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::invoice;
    use super::*;
    use time::macros::date;

    fn d(v: &str) -> Decimal {
        v.parse().unwrap()
    }

    fn draft(q: &str, price: &str, disc: &str) -> ItemDraft {
        ItemDraft {
            description: "work".into(),
            quantity: d(q),
            unit_price: d(price),
            discount: d(disc),
        }
    }

    fn captured(amount: &str, txn: &str) -> CapturedPayment {
        CapturedPayment {
            amount: d(amount),
            method: "upi".into(),
            transaction_id: txn.into(),
        }
    }

    #[test]
    fn totals_apply_line_then_invoice_discount() {
        let t = compute_totals(
            vec![draft("2", "1500", "10"), draft("1", "999.99", "0")],
            d("5"),
        );
        assert_eq!(t.items[0].total, d("2700.00"));
        assert_eq!(t.items[1].total, d("999.99"));
        assert_eq!(t.subtotal, d("3699.99"));
        // 3699.99 * 0.95 = 3514.9905
        assert_eq!(t.total, d("3514.99"));
    }

    #[test]
    fn line_totals_round_half_away_from_zero() {
        assert_eq!(line_total(d("1"), d("0.125"), d("0")), d("0.13"));
        assert_eq!(line_total(d("3"), d("33.33"), d("100")), d("0.00"));
    }

    #[test]
    fn balance_never_goes_negative() {
        assert_eq!(balance(d("100"), d("30")), d("70"));
        assert_eq!(balance(d("100"), d("130")), Decimal::ZERO);
    }

    #[test]
    fn minimum_advance_is_twenty_percent_rounded_up() {
        assert_eq!(minimum_advance(d("1000")), d("200"));
        assert_eq!(minimum_advance(d("999")), d("200"));
        assert_eq!(minimum_advance(d("12.5")), d("3"));
    }

    #[test]
    fn past_due_unpaid_invoices_are_overdue() {
        let today = date!(2025 - 02 - 01);
        let due = date!(2025 - 01 - 31);
        assert_eq!(
            effective_status(InvoiceStatus::Sent, due, today),
            InvoiceStatus::Overdue
        );
        assert_eq!(
            effective_status(InvoiceStatus::AdvancePaid, due, today),
            InvoiceStatus::Overdue
        );
        assert_eq!(
            effective_status(InvoiceStatus::Paid, due, today),
            InvoiceStatus::Paid
        );
        assert_eq!(
            effective_status(InvoiceStatus::Draft, today, today),
            InvoiceStatus::Draft
        );
    }

    #[test]
    fn partial_payment_marks_advance_paid() {
        let mut inv = invoice(d("1000"));
        let out = apply_payment(&mut inv, captured("300", "pay_1"), OffsetDateTime::now_utc());
        assert_eq!(out, PaymentOutcome::Applied(PaymentKind::Advance));
        assert_eq!(inv.status, InvoiceStatus::AdvancePaid);
        assert_eq!(inv.paid_amount, d("300"));
        assert_eq!(inv.balance, d("700"));
        assert!(inv.paid_date.is_none());
        assert_eq!(inv.payment_history.len(), 1);
    }

    #[test]
    fn cumulative_payments_reaching_total_mark_paid() {
        let mut inv = invoice(d("1000"));
        let now = OffsetDateTime::now_utc();
        apply_payment(&mut inv, captured("300", "pay_1"), now);
        let out = apply_payment(&mut inv, captured("700", "pay_2"), now);
        // each payment is smaller than the total, so it is recorded as an advance
        assert_eq!(out, PaymentOutcome::Applied(PaymentKind::Advance));
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.paid_date, Some(now));
        assert_eq!(inv.balance, Decimal::ZERO);
    }

    #[test]
    fn full_payment_in_one_go() {
        let mut inv = invoice(d("1000"));
        let out = apply_payment(&mut inv, captured("1000", "pay_1"), OffsetDateTime::now_utc());
        assert_eq!(out, PaymentOutcome::Applied(PaymentKind::Full));
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.payment_history[0].status, PaymentKind::Full);
    }

    #[test]
    fn repeated_transaction_is_not_counted_twice() {
        let mut inv = invoice(d("1000"));
        let now = OffsetDateTime::now_utc();
        apply_payment(&mut inv, captured("300", "pay_1"), now);
        let out = apply_payment(&mut inv, captured("300", "pay_1"), now);
        assert_eq!(out, PaymentOutcome::Duplicate);
        assert_eq!(inv.paid_amount, d("300"));
        assert_eq!(inv.payment_history.len(), 1);
    }
}
