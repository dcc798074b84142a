use crate::auth::repo_types::{Role, User, UserChanges};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Advisory lock key serializing open (invite-less) registrations.
const OPEN_REGISTRATION_LOCK: i64 = 0x1_0000_0001;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, profile_image, created_at, updated_at";

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Hold the open-registration lock until the surrounding transaction ends,
    /// so only one caller at a time can see an empty `users` table.
    pub async fn lock_open_registration<'e, E: PgExecutor<'e>>(db: E) -> anyhow::Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(OPEN_REGISTRATION_LOCK)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Create a new user. Without an explicit role the first account in the
    /// deployment becomes `admin` and every later one `team`.
    pub async fn create<'e, E: PgExecutor<'e>>(
        db: E,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Option<Role>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, COALESCE(
                $4,
                CASE WHEN EXISTS (SELECT 1 FROM users)
                     THEN 'team'::user_role
                     ELSE 'admin'::user_role
                END
            ))
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    pub async fn update(db: &PgPool, id: Uuid, changes: &UserChanges) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name          = COALESCE($2, name),
                   email         = COALESCE($3, email),
                   password_hash = COALESCE($4, password_hash),
                   profile_image = COALESCE($5, profile_image),
                   updated_at    = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(changes.profile_image.as_deref())
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}
