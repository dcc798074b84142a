use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::Invite;
use crate::auth::repo_types::Role;

const INVITE_COLUMNS: &str = "id, email, token, role, invited_by, accepted, created_at, updated_at";

pub async fn create(
    db: &PgPool,
    email: &str,
    token: &str,
    role: Role,
    invited_by: Uuid,
) -> anyhow::Result<Invite> {
    let invite = sqlx::query_as::<_, Invite>(&format!(
        r#"
        INSERT INTO invites (email, token, role, invited_by)
        VALUES ($1, $2, $3, $4)
        RETURNING {INVITE_COLUMNS}
        "#
    ))
    .bind(email)
    .bind(token)
    .bind(role)
    .bind(invited_by)
    .fetch_one(db)
    .await?;
    Ok(invite)
}

pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Invite>> {
    let rows = sqlx::query_as::<_, Invite>(&format!(
        "SELECT {INVITE_COLUMNS} FROM invites ORDER BY created_at DESC"
    ))
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Mark a pending invite for `email` as accepted. `None` when the token is
/// unknown, already used, or issued to another address.
pub async fn claim_tx(
    tx: &mut Transaction<'_, Postgres>,
    token: &str,
    email: &str,
) -> anyhow::Result<Option<Invite>> {
    let invite = sqlx::query_as::<_, Invite>(&format!(
        r#"
        UPDATE invites
           SET accepted = TRUE, updated_at = now()
         WHERE token = $1 AND email = $2 AND accepted = FALSE
        RETURNING {INVITE_COLUMNS}
        "#
    ))
    .bind(token)
    .bind(email)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(invite)
}
