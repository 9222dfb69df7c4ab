//! Test Helper Utilities
//!
//! Shared setup for pcv-server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use pcv_common::db::{init_database, ResultRecord, UserIdentity};
use pcv_server::config::ServiceConfig;
use pcv_server::content::{ContentError, ContentHandle, ContentStore, FsContentStore};
use pcv_server::job::{JobOutcome, JobState};
use pcv_server::AppState;

/// Test state backed by a temporary database and blob directory.
///
/// The TempDir must stay alive for the duration of the test.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub state: AppState,
}

/// Config with short delays so pipeline tests run quickly
pub fn fast_config(expected_fingerprint: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.pipeline.expected_fingerprint = expected_fingerprint.to_string();
    config.pipeline.verification_delay_ms = 10;
    config.pipeline.worker_count = 2;
    config.pipeline.retry_backoff_ms = 10;
    config.pipeline.poll_interval_ms = 50;
    config
}

pub async fn test_env(config: ServiceConfig) -> TestEnv {
    let temp_dir = TempDir::new().unwrap();
    let content = Arc::new(FsContentStore::new(temp_dir.path().join("blobs")));
    test_env_with_store(temp_dir, content, config).await
}

pub async fn test_env_with_store(
    temp_dir: TempDir,
    content: Arc<dyn ContentStore>,
    config: ServiceConfig,
) -> TestEnv {
    let db_pool = init_database(&temp_dir.path().join("test_pcv.db"))
        .await
        .unwrap();
    let state = AppState::new(db_pool, content, config);
    TestEnv { temp_dir, state }
}

pub fn alice() -> UserIdentity {
    UserIdentity {
        id: "user-alice".to_string(),
        email: "alice@example.com".to_string(),
    }
}

pub fn bob() -> UserIdentity {
    UserIdentity {
        id: "user-bob".to_string(),
        email: "bob@example.com".to_string(),
    }
}

/// Store `bytes` and submit them for `user`
pub async fn upload_and_submit(state: &AppState, user: &UserIdentity, bytes: &[u8]) -> uuid::Uuid {
    let handle = state.content.put(bytes.to_vec()).await.unwrap();
    state.submissions.submit(Some(handle), user).await.unwrap()
}

/// Claim and run the next queued job the way a worker does, settling it in the queue
pub async fn run_next_job(state: &AppState) -> Option<JobOutcome> {
    let mut job = state.queue.claim_next().await.unwrap()?;
    let runner = state.verification_runner();
    let outcome = runner.run(&mut job).await.unwrap();
    match &outcome {
        JobOutcome::Completed { .. } => state.queue.complete(job.job_id).await.unwrap(),
        JobOutcome::Dropped { reason } => state.queue.fail(job.job_id, reason).await.unwrap(),
    }
    assert!(job.state.is_terminal());
    Some(outcome)
}

/// Poll the history of `email` until it holds `count` records or `timeout` passes
pub async fn wait_for_results(
    state: &AppState,
    email: &str,
    count: usize,
    timeout: Duration,
) -> Vec<ResultRecord> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let records = state.results.query(email).await.unwrap();
        if records.len() >= count || tokio::time::Instant::now() >= deadline {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until `count` jobs are in `job_state` or `timeout` passes
pub async fn wait_for_jobs(state: &AppState, job_state: JobState, count: i64, timeout: Duration) -> i64 {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let current = state.queue.count_in_state(job_state).await.unwrap();
        if current >= count || tokio::time::Instant::now() >= deadline {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Content store whose backend is permanently unreachable
pub struct UnavailableContentStore;

#[async_trait]
impl ContentStore for UnavailableContentStore {
    async fn put(&self, _bytes: Vec<u8>) -> Result<ContentHandle, ContentError> {
        Ok(ContentHandle::new())
    }

    async fn fetch(&self, _handle: &ContentHandle) -> Result<Vec<u8>, ContentError> {
        Err(ContentError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "content backend offline",
        )))
    }
}
