use rust_decimal::Decimal;
use sqlx::{types::Json, PgExecutor, PgPool, Postgres, Transaction};
use time::Date;
use uuid::Uuid;

use super::repo_types::{Invoice, InvoiceContents, InvoiceRow, InvoiceStatus, NewInvoice};

const INVOICE_SELECT: &str = r#"
    SELECT i.id, i.invoice_number, i.client_id,
           c.name AS client_name, c.email AS client_email, c.company AS client_company,
           c.address AS client_address, c.phone AS client_phone,
           i.items, i.subtotal, i.discount, i.total, i.balance, i.status,
           i.issued_date, i.due_date, i.paid_date, i.advance_amount, i.paid_amount,
           i.payment_link_id, i.payment_link_url, i.payment_history, i.currency,
           i.payment_terms, i.original_invoice_id, i.created_by, i.created_at, i.updated_at
      FROM invoices i
      JOIN clients c ON c.id = i.client_id
"#;

/// Flip every unpaid invoice that is past due to `overdue`.
pub async fn mark_overdue(db: &PgPool, today: Date) -> anyhow::Result<u64> {
    let res = sqlx::query(
        r#"
        UPDATE invoices
           SET status = 'overdue', updated_at = now()
         WHERE due_date < $1
           AND status NOT IN ('paid', 'overdue')
        "#,
    )
    .bind(today)
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Invoice>> {
    let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
        "{INVOICE_SELECT} ORDER BY i.created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Invoice::from).collect())
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<Option<Invoice>> {
    let row = sqlx::query_as::<_, InvoiceRow>(&format!("{INVOICE_SELECT} WHERE i.id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(row.map(Invoice::from))
}

pub async fn find_by_number(db: &PgPool, number: &str) -> anyhow::Result<Option<Invoice>> {
    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        "{INVOICE_SELECT} WHERE i.invoice_number = $1"
    ))
    .bind(number)
    .fetch_optional(db)
    .await?;
    Ok(row.map(Invoice::from))
}

/// Row-locked read for read-modify-write inside a transaction.
pub async fn lock_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> anyhow::Result<Option<Invoice>> {
    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        "{INVOICE_SELECT} WHERE i.id = $1 FOR UPDATE OF i"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(Invoice::from))
}

/// Locks the invoice a gateway payment belongs to: by stored link/order id
/// first, then by invoice number.
pub async fn lock_for_payment(
    tx: &mut Transaction<'_, Postgres>,
    link_ids: &[String],
    invoice_number: Option<&str>,
) -> anyhow::Result<Option<Invoice>> {
    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        r#"
        {INVOICE_SELECT}
         WHERE i.payment_link_id = ANY($1)
            OR ($2::text IS NOT NULL AND i.invoice_number = $2)
         ORDER BY (i.payment_link_id = ANY($1)) DESC NULLS LAST
         LIMIT 1
         FOR UPDATE OF i
        "#
    ))
    .bind(link_ids)
    .bind(invoice_number)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(Invoice::from))
}

/// Insert unless the invoice number is taken, in which case `None` comes
/// back and the surrounding transaction stays usable.
pub async fn insert<'e, E: PgExecutor<'e>>(
    db: E,
    new: &NewInvoice,
) -> anyhow::Result<Option<Uuid>> {
    let c = &new.contents;
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO invoices (
            invoice_number, client_id, items, subtotal, discount, total, balance,
            status, issued_date, due_date, advance_amount, currency, payment_terms,
            original_invoice_id, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $6, 'draft', $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT ON CONSTRAINT invoices_invoice_number_key DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&new.invoice_number)
    .bind(c.client_id)
    .bind(Json(&c.items))
    .bind(c.subtotal)
    .bind(c.discount)
    .bind(c.total)
    .bind(c.issued_date)
    .bind(c.due_date)
    .bind(c.advance_amount)
    .bind(&c.currency)
    .bind(c.payment_terms.as_deref())
    .bind(new.original_invoice_id)
    .bind(new.created_by)
    .fetch_optional(db)
    .await?;
    Ok(id)
}

pub async fn update_contents<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    c: &InvoiceContents,
    balance: Decimal,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE invoices
           SET client_id = $2, items = $3, subtotal = $4, discount = $5, total = $6,
               balance = $7, issued_date = $8, due_date = $9, advance_amount = $10,
               currency = $11, payment_terms = $12, updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(c.client_id)
    .bind(Json(&c.items))
    .bind(c.subtotal)
    .bind(c.discount)
    .bind(c.total)
    .bind(balance)
    .bind(c.issued_date)
    .bind(c.due_date)
    .bind(c.advance_amount)
    .bind(&c.currency)
    .bind(c.payment_terms.as_deref())
    .execute(db)
    .await?;
    Ok(())
}

pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM invoices WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Setting `paid` stamps `paid_date` unless one is already recorded.
pub async fn set_status(db: &PgPool, id: Uuid, status: InvoiceStatus) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE invoices
           SET status = $2,
               paid_date = CASE WHEN $2 = 'paid'::invoice_status
                                THEN COALESCE(paid_date, now())
                                ELSE paid_date END,
               updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Remember the gateway link so the webhook can find the invoice again.
/// `advance_amount` is only overwritten when given.
pub async fn set_payment_link(
    db: &PgPool,
    id: Uuid,
    link_id: &str,
    link_url: Option<&str>,
    advance_amount: Option<Decimal>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE invoices
           SET payment_link_id = $2,
               payment_link_url = $3,
               advance_amount = COALESCE($4, advance_amount),
               updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(link_id)
    .bind(link_url)
    .bind(advance_amount)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn save_payment(
    tx: &mut Transaction<'_, Postgres>,
    invoice: &Invoice,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE invoices
           SET paid_amount = $2, balance = $3, status = $4, paid_date = $5,
               payment_history = $6, updated_at = now()
         WHERE id = $1
        "#,
    )
    .bind(invoice.id)
    .bind(invoice.paid_amount)
    .bind(invoice.balance)
    .bind(invoice.status)
    .bind(invoice.paid_date)
    .bind(Json(&invoice.payment_history))
    .execute(&mut **tx)
    .await?;
    Ok(())
}
