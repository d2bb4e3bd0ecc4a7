use sqlx::{query, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, UserSessionsRepo};
use crate::domain::users::{UserRole, UserSessionRecord, UserStatus};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct UserSessionRow {
    id: Uuid,
    prefix: String,
    hashed_secret: Vec<u8>,
    expires_at: OffsetDateTime,
    revoked_at: Option<OffsetDateTime>,
    user_id: Uuid,
    email: String,
    role: UserRole,
    status: UserStatus,
}

impl From<UserSessionRow> for UserSessionRecord {
    fn from(row: UserSessionRow) -> Self {
        UserSessionRecord {
            id: row.id,
            prefix: row.prefix,
            hashed_secret: row.hashed_secret,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            user_id: row.user_id,
            email: row.email,
            role: row.role,
            status: row.status,
        }
    }
}

#[async_trait::async_trait]
impl UserSessionsRepo for PostgresRepositories {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Option<UserSessionRecord>, RepoError> {
        let row = query_as::<_, UserSessionRow>(
            r#"
            SELECT s.id, s.prefix, s.hashed_secret, s.expires_at, s.revoked_at,
                   u.id AS user_id, u.email, u.role, u.status
            FROM user_sessions s
            INNER JOIN users u ON u.id = s.user_id
            WHERE s.prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn update_last_seen(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        query("UPDATE user_sessions SET last_seen_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
