//! Result store and history query
//!
//! Results are append-only: inserted once by the job that produced them and
//! never updated. The producing job's id is stored alongside each record and
//! is unique, so a job redelivered by the queue cannot add a second record.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use pcv_common::db::ResultRecord;
use pcv_common::time::{parse_db_timestamp, to_db_timestamp};
use pcv_common::{Error, Result};

use crate::utils::{db_retry::DEFAULT_MAX_LOCK_WAIT_MS, retry_on_lock};

/// Outcome of [`ResultStore::insert`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    /// The job already recorded a result on an earlier attempt
    AlreadyRecorded(ResultRecord),
}

#[derive(Clone)]
pub struct ResultStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl ResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Append `record` as the result of `job_id`
    pub async fn insert(&self, job_id: Uuid, record: &ResultRecord) -> Result<PersistOutcome> {
        // Prepare all data before touching the pool
        let id = record.id.to_string();
        let job_id_str = job_id.to_string();
        let score = i64::try_from(record.score)
            .map_err(|_| Error::InvalidInput(format!("Score out of range: {}", record.score)))?;
        let submitted_at = to_db_timestamp(&record.submitted_at);

        let inserted = retry_on_lock("insert_result", self.max_lock_wait_ms, || async {
            let done = sqlx::query(
                r#"
                INSERT INTO results (id, job_id, user, score, submitted_at, fingerprint)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(job_id) DO NOTHING
                "#,
            )
            .bind(&id)
            .bind(&job_id_str)
            .bind(&record.user)
            .bind(score)
            .bind(&submitted_at)
            .bind(&record.fingerprint)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(done.rows_affected() == 1)
        })
        .await?;

        if inserted {
            return Ok(PersistOutcome::Inserted);
        }

        let existing = self.find_by_job(job_id).await?.ok_or_else(|| {
            Error::Internal(format!("Result for job {} vanished after conflict", job_id))
        })?;
        Ok(PersistOutcome::AlreadyRecorded(existing))
    }

    /// All results for `user`, earliest first
    pub async fn query(&self, user: &str) -> Result<Vec<ResultRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user, score, submitted_at, fingerprint
            FROM results
            WHERE user = ?
            ORDER BY submitted_at ASC, id ASC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// The result recorded by `job_id`, if any
    pub async fn find_by_job(&self, job_id: Uuid) -> Result<Option<ResultRecord>> {
        let row = sqlx::query(
            "SELECT id, user, score, submitted_at, fingerprint FROM results WHERE job_id = ?",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResultRecord> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Corrupt result id '{}': {}", id, e)))?;

    let score: i64 = row.get("score");
    let score = u64::try_from(score)
        .map_err(|_| Error::Internal(format!("Negative score stored for result {}", id)))?;

    let submitted_at: String = row.get("submitted_at");

    Ok(ResultRecord {
        id,
        user: row.get("user"),
        score,
        submitted_at: parse_db_timestamp(&submitted_at)?,
        fingerprint: row.get("fingerprint"),
    })
}
