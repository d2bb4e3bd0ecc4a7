use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageWindow;
use crate::application::repos::{RecordScope, RepoError, TravelDataPage, TravelDataRepo};
use crate::domain::travel_data::{
    FlightStatus, NewTravelData, PaymentStatus, TravelDataPatch, TravelDataRecord,
};

use super::{PostgresRepositories, TRAVEL_DATA_COLUMNS, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TravelDataRow {
    id: Uuid,
    session_id: Option<String>,
    date: String,
    voucher: String,
    reference: Option<String>,
    narration: Option<String>,
    debit: f64,
    credit: f64,
    balance: f64,
    customer_name: String,
    route: String,
    pnr: String,
    flying_date: Option<String>,
    flight_status: FlightStatus,
    customer_rate: f64,
    company_rate: f64,
    profit: f64,
    payment_status: PaymentStatus,
    owner_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TravelDataRow> for TravelDataRecord {
    fn from(row: TravelDataRow) -> Self {
        TravelDataRecord {
            id: row.id,
            session_id: row.session_id,
            date: row.date,
            voucher: row.voucher,
            reference: row.reference,
            narration: row.narration,
            debit: row.debit,
            credit: row.credit,
            balance: row.balance,
            customer_name: row.customer_name,
            route: row.route,
            pnr: row.pnr,
            flying_date: row.flying_date,
            flight_status: row.flight_status,
            customer_rate: row.customer_rate,
            company_rate: row.company_rate,
            profit: row.profit,
            payment_status: row.payment_status,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Append `INSERT ... VALUES` for `records`; shared with the upload-session import.
///
/// Every row gets the same `now`; `seq` is assigned in `records` order, so the
/// list order within one batch follows the input.
pub(super) fn push_insert<'q>(
    qb: &mut QueryBuilder<'q, Postgres>,
    records: &'q [NewTravelData],
    now: OffsetDateTime,
) {
    qb.push(
        "INSERT INTO travel_data (id, session_id, date, voucher, reference, narration, \
         debit, credit, balance, customer_name, route, pnr, flying_date, flight_status, \
         customer_rate, company_rate, profit, payment_status, owner_id, created_at, updated_at) ",
    );
    qb.push_values(records, |mut b, record| {
        b.push_bind(record.id)
            .push_bind(record.session_id.as_deref())
            .push_bind(record.date.as_str())
            .push_bind(record.voucher.as_str())
            .push_bind(record.reference.as_deref())
            .push_bind(record.narration.as_deref())
            .push_bind(record.debit)
            .push_bind(record.credit)
            .push_bind(record.balance)
            .push_bind(record.customer_name.as_str())
            .push_bind(record.route.as_str())
            .push_bind(record.pnr.as_str())
            .push_bind(record.flying_date.as_deref())
            .push_bind(record.flight_status)
            .push_bind(record.customer_rate)
            .push_bind(record.company_rate)
            .push_bind(record.profit)
            .push_bind(record.payment_status)
            .push_bind(record.owner_id)
            .push_bind(now)
            .push_bind(now);
    });
}

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: RecordScope) {
    if let Some(owner) = scope.owner {
        qb.push(" AND owner_id = ");
        qb.push_bind(owner);
    }
}

fn push_patch<'q>(qb: &mut QueryBuilder<'q, Postgres>, patch: &'q TravelDataPatch) {
    macro_rules! set {
        ($field:ident) => {
            if let Some(value) = patch.$field.as_ref() {
                qb.push(concat!(", ", stringify!($field), " = "));
                qb.push_bind(value);
            }
        };
    }

    set!(session_id);
    set!(date);
    set!(voucher);
    set!(reference);
    set!(narration);
    set!(debit);
    set!(credit);
    set!(balance);
    set!(customer_name);
    set!(route);
    set!(pnr);
    set!(flying_date);
    set!(flight_status);
    set!(customer_rate);
    set!(company_rate);
    set!(profit);
    set!(payment_status);
}

#[async_trait::async_trait]
impl TravelDataRepo for PostgresRepositories {
    async fn insert(&self, record: NewTravelData) -> Result<TravelDataRecord, RepoError> {
        let records = [record];
        let mut qb = QueryBuilder::new("");
        push_insert(&mut qb, &records, OffsetDateTime::now_utc());
        qb.push(" RETURNING ");
        qb.push(TRAVEL_DATA_COLUMNS);

        let row = qb
            .build_query_as::<TravelDataRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn list_by_session(
        &self,
        session_id: &str,
        scope: RecordScope,
        window: PageWindow,
    ) -> Result<TravelDataPage, RepoError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM travel_data WHERE session_id = ");
        count.push_bind(session_id);
        push_scope(&mut count, scope);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(TRAVEL_DATA_COLUMNS);
        qb.push(" FROM travel_data WHERE session_id = ");
        qb.push_bind(session_id);
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY created_at DESC, seq DESC LIMIT ");
        qb.push_bind(window.limit() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(window.offset() as i64);

        let rows = qb
            .build_query_as::<TravelDataRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(TravelDataPage {
            items: rows.into_iter().map(Into::into).collect(),
            total: Self::convert_count(total)?,
        })
    }

    async fn update(
        &self,
        id: Uuid,
        scope: RecordScope,
        patch: &TravelDataPatch,
    ) -> Result<Option<TravelDataRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "UPDATE travel_data SET updated_at = GREATEST(now(), updated_at + interval '1 microsecond')",
        );
        push_patch(&mut qb, patch);
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        push_scope(&mut qb, scope);
        qb.push(" RETURNING ");
        qb.push(TRAVEL_DATA_COLUMNS);

        let row = qb
            .build_query_as::<TravelDataRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: Uuid, scope: RecordScope) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::new("DELETE FROM travel_data WHERE id = ");
        qb.push_bind(id);
        push_scope(&mut qb, scope);

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}
