use sqlx::{QueryBuilder, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RecordScope, RepoError, UploadSessionsRepo};
use crate::domain::travel_data::NewTravelData;
use crate::domain::upload_sessions::{NewUploadSession, OpeningBalance, UploadSessionRecord};

use super::travel_data::push_insert;
use super::{PostgresRepositories, map_sqlx_error};

const SESSION_COLUMNS: &str = "id, filename, opening_balance_date, opening_balance_amount, \
    total_records, owner_id, created_at, updated_at";

// Keeps each multi-row INSERT well under the 65535 bind-parameter limit.
const INSERT_CHUNK: usize = 1000;

#[derive(Debug, sqlx::FromRow)]
struct UploadSessionRow {
    id: Uuid,
    filename: String,
    opening_balance_date: Option<String>,
    opening_balance_amount: Option<f64>,
    total_records: i64,
    owner_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UploadSessionRow> for UploadSessionRecord {
    fn from(row: UploadSessionRow) -> Self {
        let opening_balance = match (row.opening_balance_date, row.opening_balance_amount) {
            (Some(date), Some(amount)) => Some(OpeningBalance { date, amount }),
            _ => None,
        };
        UploadSessionRecord {
            id: row.id,
            filename: row.filename,
            opening_balance,
            total_records: row.total_records,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait::async_trait]
impl UploadSessionsRepo for PostgresRepositories {
    async fn create_with_records(
        &self,
        session: NewUploadSession,
        records: Vec<NewTravelData>,
    ) -> Result<UploadSessionRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO upload_sessions (id, filename, opening_balance_date, \
             opening_balance_amount, total_records, owner_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {SESSION_COLUMNS}"
        );
        let row = query_as::<_, UploadSessionRow>(&sql)
            .bind(session.id)
            .bind(&session.filename)
            .bind(session.opening_balance.as_ref().map(|b| b.date.as_str()))
            .bind(session.opening_balance.as_ref().map(|b| b.amount))
            .bind(records.len() as i64)
            .bind(session.owner_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut qb = QueryBuilder::new("");
            push_insert(&mut qb, chunk, now);
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn list_sessions(
        &self,
        scope: RecordScope,
    ) -> Result<Vec<UploadSessionRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(SESSION_COLUMNS);
        qb.push(" FROM upload_sessions WHERE TRUE");
        if let Some(owner) = scope.owner {
            qb.push(" AND owner_id = ");
            qb.push_bind(owner);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");

        let rows = qb
            .build_query_as::<UploadSessionRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_session(
        &self,
        id: Uuid,
        scope: RecordScope,
    ) -> Result<Option<UploadSessionRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(SESSION_COLUMNS);
        qb.push(" FROM upload_sessions WHERE id = ");
        qb.push_bind(id);
        if let Some(owner) = scope.owner {
            qb.push(" AND owner_id = ");
            qb.push_bind(owner);
        }

        let row = qb
            .build_query_as::<UploadSessionRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }
}
