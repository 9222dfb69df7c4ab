//! Durable job queue
//!
//! Jobs live in the `verification_jobs` table, so an accepted submission
//! outlives both the request that enqueued it and the process. Delivery is
//! at-least-once: a job left `running` by a crash is handed out again after
//! [`JobQueue::recover_interrupted`].

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use pcv_common::db::UserIdentity;
use pcv_common::time::{parse_db_timestamp, to_db_timestamp};
use pcv_common::{Error, Result};

use crate::content::ContentHandle;
use crate::job::{JobState, SubmissionJob};
use crate::utils::{db_retry::DEFAULT_MAX_LOCK_WAIT_MS, retry_on_lock};

const JOB_COLUMNS: &str =
    "job_id, content_handle, user_id, user_email, state, attempts, enqueued_at";

#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
    wakeup: Arc<Notify>,
    max_lock_wait_ms: u64,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            wakeup: Arc::new(Notify::new()),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    /// Persist a new `queued` job and wake one idle worker
    pub async fn enqueue(
        &self,
        content_handle: ContentHandle,
        user: &UserIdentity,
    ) -> Result<SubmissionJob> {
        let job = SubmissionJob::new(content_handle, user.clone());
        let job_id = job.job_id.to_string();
        let handle = job.content_handle.to_string();
        let enqueued_at = to_db_timestamp(&job.enqueued_at);

        retry_on_lock("enqueue_job", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO verification_jobs (
                    job_id, content_handle, user_id, user_email, state,
                    attempts, enqueued_at, updated_at, not_before
                ) VALUES (?, ?, ?, ?, 'queued', 0, ?, ?, ?)
                "#,
            )
            .bind(&job_id)
            .bind(&handle)
            .bind(&job.user.id)
            .bind(&job.user.email)
            .bind(&enqueued_at)
            .bind(&enqueued_at)
            .bind(&enqueued_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        self.wakeup.notify_one();
        Ok(job)
    }

    /// Claim the oldest eligible job, marking it `running`.
    ///
    /// The select and update happen in one statement, so two workers never
    /// claim the same row.
    pub async fn claim_next(&self) -> Result<Option<SubmissionJob>> {
        let now = to_db_timestamp(&Utc::now());
        let sql = format!(
            r#"
            UPDATE verification_jobs
            SET state = 'running', attempts = attempts + 1, updated_at = ?
            WHERE job_id = (
                SELECT job_id FROM verification_jobs
                WHERE state = 'queued' AND not_before <= ?
                ORDER BY enqueued_at ASC, job_id ASC
                LIMIT 1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let row = retry_on_lock("claim_job", self.max_lock_wait_ms, || async {
            sqlx::query(&sql)
                .bind(&now)
                .bind(&now)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)
        })
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Settle a job that produced its result
    pub async fn complete(&self, job_id: Uuid) -> Result<()> {
        self.settle(job_id, JobState::Completed, None).await
    }

    /// Settle a job that will not be attempted again
    pub async fn fail(&self, job_id: Uuid, reason: &str) -> Result<()> {
        self.settle(job_id, JobState::Failed, Some(reason)).await
    }

    /// Hand a running job back to the queue, eligible again after `delay`
    pub async fn retry_later(&self, job_id: Uuid, reason: &str, delay: Duration) -> Result<()> {
        let now = Utc::now();
        let updated_at = to_db_timestamp(&now);
        let not_before = to_db_timestamp(
            &(now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())),
        );
        let job_id_str = job_id.to_string();

        let changed = retry_on_lock("requeue_job", self.max_lock_wait_ms, || async {
            let done = sqlx::query(
                r#"
                UPDATE verification_jobs
                SET state = 'queued', last_error = ?, updated_at = ?, not_before = ?
                WHERE job_id = ? AND state = 'running'
                "#,
            )
            .bind(reason)
            .bind(&updated_at)
            .bind(&not_before)
            .bind(&job_id_str)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(done.rows_affected())
        })
        .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("Running job {}", job_id)));
        }
        self.wakeup.notify_one();
        Ok(())
    }

    async fn settle(&self, job_id: Uuid, state: JobState, reason: Option<&str>) -> Result<()> {
        let updated_at = to_db_timestamp(&Utc::now());
        let job_id_str = job_id.to_string();

        let changed = retry_on_lock("settle_job", self.max_lock_wait_ms, || async {
            let done = sqlx::query(
                r#"
                UPDATE verification_jobs
                SET state = ?, last_error = COALESCE(?, last_error), updated_at = ?
                WHERE job_id = ? AND state = 'running'
                "#,
            )
            .bind(state.as_str())
            .bind(reason)
            .bind(&updated_at)
            .bind(&job_id_str)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(done.rows_affected())
        })
        .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("Running job {}", job_id)));
        }
        Ok(())
    }

    /// Requeue jobs left `running` by a previous process.
    ///
    /// Call once at startup, before any worker runs.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let now = to_db_timestamp(&Utc::now());
        let done = sqlx::query(
            r#"
            UPDATE verification_jobs
            SET state = 'queued', updated_at = ?, not_before = ?,
                last_error = 'interrupted before completion'
            WHERE state = 'running'
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let recovered = done.rows_affected();
        if recovered > 0 {
            tracing::warn!(recovered, "Requeued jobs interrupted by a previous shutdown");
            self.wakeup.notify_waiters();
        }
        Ok(recovered)
    }

    /// Look up a job by id
    pub async fn get(&self, job_id: Uuid) -> Result<Option<SubmissionJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM verification_jobs WHERE job_id = ?",
            JOB_COLUMNS
        ))
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Last recorded failure reason for a job
    pub async fn last_error(&self, job_id: Uuid) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT last_error FROM verification_jobs WHERE job_id = ?")
                .bind(job_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.flatten())
    }

    /// Number of jobs currently in `state`
    pub async fn count_in_state(&self, state: JobState) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM verification_jobs WHERE state = ?")
                .bind(state.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Wait until a job may have become claimable
    pub async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }
}

fn job_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SubmissionJob> {
    let job_id: String = row.get("job_id");
    let job_id = Uuid::parse_str(&job_id)
        .map_err(|e| Error::Internal(format!("Corrupt job id '{}': {}", job_id, e)))?;

    let handle: String = row.get("content_handle");
    let content_handle = ContentHandle::parse(&handle)
        .map_err(|e| Error::Internal(format!("Job {}: {}", job_id, e)))?;

    let state: String = row.get("state");
    let attempts: i64 = row.get("attempts");
    let enqueued_at: String = row.get("enqueued_at");

    Ok(SubmissionJob {
        job_id,
        content_handle,
        user: UserIdentity {
            id: row.get("user_id"),
            email: row.get("user_email"),
        },
        state: state.parse()?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        enqueued_at: parse_db_timestamp(&enqueued_at)?,
    })
}
