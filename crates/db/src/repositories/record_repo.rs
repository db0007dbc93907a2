//! Repository for the `records` table.
//!
//! Besides CRUD, this repo builds the equality filters the rule evaluator
//! and the duplicate detector rely on. All matching queries order by `id
//! ASC` so "first found" is stable across runs.

use sqlx::{PgExecutor, PgPool};
use tally_core::fields::MatchField;
use tally_core::matching::RecordSnapshot;
use tally_core::types::{DbId, Timestamp};

use crate::models::record::{NewRecord, Record, RecordCorrection};

/// Column list for `records` queries.
const COLUMNS: &str = "\
    id, upload_job_id, transaction_id, amount, reference_number, \
    transaction_date, additional_data, created_at, updated_at";

/// Binds per row in the batch INSERT.
const INSERT_BINDS: usize = 6;

/// Provides CRUD and match-filter queries for records.
pub struct RecordRepo;

impl RecordRepo {
    /// Batch insert validated rows inside the caller's transaction.
    ///
    /// Uses a single INSERT with multiple value rows for efficiency.
    pub async fn insert_batch<'e>(
        exec: impl PgExecutor<'e>,
        records: &[NewRecord],
    ) -> Result<Vec<Record>, sqlx::Error> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = String::from(
            "INSERT INTO records \
                 (upload_job_id, transaction_id, amount, reference_number, \
                  transaction_date, additional_data) \
             VALUES ",
        );
        let mut param_idx = 1usize;
        for i in 0..records.len() {
            if i > 0 {
                query.push_str(", ");
            }
            query.push('(');
            for j in 0..INSERT_BINDS {
                if j > 0 {
                    query.push_str(", ");
                }
                query.push_str(&format!("${param_idx}"));
                param_idx += 1;
            }
            query.push(')');
        }
        query.push_str(&format!(" RETURNING {COLUMNS}"));

        let mut q = sqlx::query_as::<_, Record>(&query);
        for record in records {
            q = q
                .bind(record.upload_job_id)
                .bind(&record.transaction_id)
                .bind(record.amount)
                .bind(&record.reference_number)
                .bind(record.transaction_date)
                .bind(&record.additional_data);
        }

        q.fetch_all(exec).await
    }

    /// Find a record by its ID.
    pub async fn find_by_id<'e>(
        exec: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<Record>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM records WHERE id = $1");
        sqlx::query_as::<_, Record>(&query)
            .bind(id)
            .fetch_optional(exec)
            .await
    }

    /// Fetch a set of records by ID, in id order.
    pub async fn find_by_ids(pool: &PgPool, ids: &[DbId]) -> Result<Vec<Record>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM records WHERE id = ANY($1) ORDER BY id ASC");
        sqlx::query_as::<_, Record>(&query)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// First record in the job equal to the candidate on every listed
    /// field, excluding the candidate's own identity.
    pub async fn find_first_equal<'e>(
        exec: impl PgExecutor<'e>,
        upload_job_id: DbId,
        fields: &[MatchField],
        candidate: &RecordSnapshot,
        exclude_id: DbId,
    ) -> Result<Option<Record>, sqlx::Error> {
        let (query, binds) = build_equality_query(fields, candidate, Some(1));
        let mut q = sqlx::query_as::<_, Record>(&query)
            .bind(upload_job_id)
            .bind(exclude_id);
        for bind in &binds {
            q = bind_field_value(q, bind);
        }
        q.fetch_optional(exec).await
    }

    /// All records in the job equal to the candidate on every listed
    /// field, excluding the candidate's own identity, in id order.
    pub async fn find_all_equal<'e>(
        exec: impl PgExecutor<'e>,
        upload_job_id: DbId,
        fields: &[MatchField],
        candidate: &RecordSnapshot,
        exclude_id: DbId,
    ) -> Result<Vec<Record>, sqlx::Error> {
        let (query, binds) = build_equality_query(fields, candidate, None);
        let mut q = sqlx::query_as::<_, Record>(&query)
            .bind(upload_job_id)
            .bind(exclude_id);
        for bind in &binds {
            q = bind_field_value(q, bind);
        }
        q.fetch_all(exec).await
    }

    /// First persisted record with this transaction id under a different
    /// upload job, if any.
    pub async fn find_in_other_jobs<'e>(
        exec: impl PgExecutor<'e>,
        transaction_id: &str,
        excluding_job_id: DbId,
    ) -> Result<Option<Record>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM records \
             WHERE transaction_id = $1 AND upload_job_id <> $2 \
             ORDER BY id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Record>(&query)
            .bind(transaction_id)
            .bind(excluding_job_id)
            .fetch_optional(exec)
            .await
    }

    /// All records with this transaction id inside one job, in id order.
    pub async fn find_same_transaction_in_job<'e>(
        exec: impl PgExecutor<'e>,
        upload_job_id: DbId,
        transaction_id: &str,
    ) -> Result<Vec<Record>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM records \
             WHERE upload_job_id = $1 AND transaction_id = $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Record>(&query)
            .bind(upload_job_id)
            .bind(transaction_id)
            .fetch_all(exec)
            .await
    }

    /// Number of records persisted under a job.
    pub async fn count_for_job(pool: &PgPool, upload_job_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)::BIGINT FROM records WHERE upload_job_id = $1",
        )
        .bind(upload_job_id)
        .fetch_one(pool)
        .await
    }

    /// Apply a manual correction, bumping `updated_at`.
    ///
    /// Returns `None` when the record does not exist; the caller is
    /// responsible for the accompanying audit entry.
    pub async fn apply_correction(
        pool: &PgPool,
        id: DbId,
        correction: &RecordCorrection,
    ) -> Result<Option<Record>, sqlx::Error> {
        let mut sets: Vec<String> = Vec::new();
        let mut bind_idx = 2u32; // $1 is the record id
        let mut binds: Vec<FieldBind> = Vec::new();

        if let Some(ref transaction_id) = correction.transaction_id {
            sets.push(format!("transaction_id = ${bind_idx}"));
            bind_idx += 1;
            binds.push(FieldBind::Text(transaction_id.clone()));
        }
        if let Some(amount) = correction.amount {
            sets.push(format!("amount = ${bind_idx}"));
            bind_idx += 1;
            binds.push(FieldBind::Number(amount));
        }
        if let Some(ref reference_number) = correction.reference_number {
            sets.push(format!("reference_number = ${bind_idx}"));
            bind_idx += 1;
            binds.push(FieldBind::Text(reference_number.clone()));
        }
        if let Some(date) = correction.date {
            sets.push(format!("transaction_date = ${bind_idx}"));
            let _ = bind_idx;
            binds.push(FieldBind::Date(date));
        }

        if sets.is_empty() {
            return Self::find_by_id(pool, id).await;
        }

        let query = format!(
            "UPDATE records SET {}, updated_at = NOW() WHERE id = $1 RETURNING {COLUMNS}",
            sets.join(", ")
        );
        let mut q = sqlx::query_as::<_, Record>(&query).bind(id);
        for bind in &binds {
            q = bind_field_value(q, bind);
        }
        q.fetch_optional(pool).await
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for field-equality queries.
enum FieldBind {
    Text(String),
    Number(f64),
    Date(Timestamp),
}

/// Database column backing a match field.
fn column_for(field: MatchField) -> &'static str {
    match field {
        MatchField::TransactionId => "transaction_id",
        MatchField::Amount => "amount",
        MatchField::ReferenceNumber => "reference_number",
        MatchField::Date => "transaction_date",
    }
}

/// Candidate value for a match field, typed for binding.
fn value_for(field: MatchField, candidate: &RecordSnapshot) -> FieldBind {
    match field {
        MatchField::TransactionId => FieldBind::Text(candidate.transaction_id.clone()),
        MatchField::Amount => FieldBind::Number(candidate.amount),
        MatchField::ReferenceNumber => FieldBind::Text(candidate.reference_number.clone()),
        MatchField::Date => FieldBind::Date(candidate.date),
    }
}

/// Build `SELECT ... WHERE upload_job_id = $1 AND id <> $2 AND field = ..`
/// over the listed fields, ordered by id. The caller binds the job id and
/// excluded id first, then the returned field values in order.
fn build_equality_query(
    fields: &[MatchField],
    candidate: &RecordSnapshot,
    limit: Option<i64>,
) -> (String, Vec<FieldBind>) {
    let mut conditions = vec!["upload_job_id = $1".to_string(), "id <> $2".to_string()];
    let mut bind_idx = 3u32;
    let mut binds: Vec<FieldBind> = Vec::new();

    for field in fields {
        conditions.push(format!("{} = ${bind_idx}", column_for(*field)));
        bind_idx += 1;
        binds.push(value_for(*field, candidate));
    }

    let limit_clause = match limit {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    };
    let query = format!(
        "SELECT {COLUMNS} FROM records WHERE {} ORDER BY id ASC{limit_clause}",
        conditions.join(" AND ")
    );

    (query, binds)
}

fn bind_field_value<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    bind: &'q FieldBind,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    match bind {
        FieldBind::Text(v) => q.bind(v.as_str()),
        FieldBind::Number(v) => q.bind(*v),
        FieldBind::Date(v) => q.bind(*v),
    }
}
