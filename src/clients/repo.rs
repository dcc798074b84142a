use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::repo_types::{Client, ClientDetails};

const CLIENT_COLUMNS: &str =
    "id, name, email, company, address, phone, created_by, created_at, updated_at";

pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Client>> {
    let rows = sqlx::query_as::<_, Client>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name ASC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Insert the client, or refresh the stored details of the client with the
/// same email. The original creator is kept.
pub async fn upsert_by_email<'e, E: PgExecutor<'e>>(
    db: E,
    details: &ClientDetails,
    created_by: Uuid,
) -> anyhow::Result<Client> {
    let client = sqlx::query_as::<_, Client>(&format!(
        r#"
        INSERT INTO clients (name, email, company, address, phone, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (email) DO UPDATE
           SET name       = EXCLUDED.name,
               company    = EXCLUDED.company,
               address    = EXCLUDED.address,
               phone      = EXCLUDED.phone,
               updated_at = CASE
                   WHEN (clients.name, clients.company, clients.address, clients.phone)
                        IS DISTINCT FROM
                        (EXCLUDED.name, EXCLUDED.company, EXCLUDED.address, EXCLUDED.phone)
                   THEN now()
                   ELSE clients.updated_at
               END
        RETURNING {CLIENT_COLUMNS}
        "#
    ))
    .bind(&details.name)
    .bind(&details.email)
    .bind(details.company.as_deref())
    .bind(details.address.as_deref())
    .bind(details.phone.as_deref())
    .bind(created_by)
    .fetch_one(db)
    .await?;
    Ok(client)
}

/// Returns `false` when no client has that id.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}
