//! Database initialization
//!
//! Opens (creating if needed) the service database and creates the tables the
//! verification pipeline uses. Every statement is idempotent, so this runs on
//! each startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // WAL lets history queries read while workers append results
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .busy_timeout(Duration::from_millis(5000))
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true),
        )
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all pcv tables on an existing pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_verification_jobs_table(pool).await?;
    create_results_table(pool).await?;
    info!("Database tables initialized (verification_jobs, results)");
    Ok(())
}

/// Durable job queue
pub async fn create_verification_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_jobs (
            job_id TEXT PRIMARY KEY,
            content_handle TEXT NOT NULL,
            user_id TEXT NOT NULL,
            user_email TEXT NOT NULL,
            state TEXT NOT NULL CHECK (state IN ('queued', 'running', 'completed', 'failed')),
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            enqueued_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            not_before TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verification_jobs_claim ON verification_jobs(state, not_before, enqueued_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only result records; `job_id` is the idempotency key
pub async fn create_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL UNIQUE,
            user TEXT NOT NULL,
            score INTEGER NOT NULL CHECK (score >= 0),
            submitted_at TEXT NOT NULL,
            fingerprint TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_user_time ON results(user, submitted_at)")
        .execute(pool)
        .await?;

    Ok(())
}
