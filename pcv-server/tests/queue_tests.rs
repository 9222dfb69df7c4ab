//! Durable job queue tests

mod helpers;

use std::time::Duration;

use helpers::{alice, bob, fast_config, test_env};
use pcv_server::content::ContentHandle;
use pcv_server::job::JobState;

#[tokio::test]
async fn test_claim_returns_oldest_job_first() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let first = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    let second = queue.enqueue(ContentHandle::new(), &bob()).await.unwrap();

    let claimed = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.job_id, first.job_id);
    assert_eq!(claimed.state, JobState::Running);
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.user, alice());
    assert_eq!(claimed.content_handle, first.content_handle);

    let claimed = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.job_id, second.job_id);

    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_on_empty_queue() {
    let env = test_env(fast_config("1111")).await;
    assert!(env.state.queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_complete_and_fail_settle_running_jobs() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let done = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    let broken = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    queue.claim_next().await.unwrap();
    queue.claim_next().await.unwrap();

    queue.complete(done.job_id).await.unwrap();
    queue.fail(broken.job_id, "content missing").await.unwrap();

    assert_eq!(
        queue.get(done.job_id).await.unwrap().unwrap().state,
        JobState::Completed
    );
    assert_eq!(
        queue.get(broken.job_id).await.unwrap().unwrap().state,
        JobState::Failed
    );
    assert_eq!(
        queue.last_error(broken.job_id).await.unwrap().as_deref(),
        Some("content missing")
    );
}

#[tokio::test]
async fn test_settling_a_queued_job_is_rejected() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let job = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();

    assert!(matches!(
        queue.complete(job.job_id).await,
        Err(pcv_common::Error::NotFound(_))
    ));
    assert_eq!(
        queue.get(job.job_id).await.unwrap().unwrap().state,
        JobState::Queued
    );
}

#[tokio::test]
async fn test_corrupt_row_is_internal_error() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let job = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    sqlx::query("UPDATE verification_jobs SET content_handle = 'not-a-handle' WHERE job_id = ?")
        .bind(job.job_id.to_string())
        .execute(&env.state.db)
        .await
        .unwrap();

    assert!(matches!(
        queue.get(job.job_id).await,
        Err(pcv_common::Error::Internal(_))
    ));
}

#[tokio::test]
async fn test_retry_later_respects_not_before() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let job = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();

    queue
        .retry_later(job.job_id, "database busy", Duration::from_secs(3600))
        .await
        .unwrap();

    assert_eq!(queue.count_in_state(JobState::Queued).await.unwrap(), 1);
    assert!(
        queue.claim_next().await.unwrap().is_none(),
        "job must not be claimable before its retry delay"
    );
}

#[tokio::test]
async fn test_retried_job_counts_attempts() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let job = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    queue.claim_next().await.unwrap().unwrap();
    queue
        .retry_later(job.job_id, "database busy", Duration::ZERO)
        .await
        .unwrap();

    let again = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(again.job_id, job.job_id);
    assert_eq!(again.attempts, 2);
    assert_eq!(
        queue.last_error(job.job_id).await.unwrap().as_deref(),
        Some("database busy")
    );
}

#[tokio::test]
async fn test_recover_interrupted_requeues_running_jobs() {
    let env = test_env(fast_config("1111")).await;
    let queue = &env.state.queue;

    let job = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    let finished = queue.enqueue(ContentHandle::new(), &alice()).await.unwrap();
    queue.claim_next().await.unwrap();
    queue.claim_next().await.unwrap();
    queue.complete(finished.job_id).await.unwrap();

    // Simulates a restart while `job` was running
    let recovered = queue.recover_interrupted().await.unwrap();

    assert_eq!(recovered, 1);
    assert_eq!(
        queue.get(job.job_id).await.unwrap().unwrap().state,
        JobState::Queued
    );
    assert_eq!(
        queue.get(finished.job_id).await.unwrap().unwrap().state,
        JobState::Completed
    );

    let reclaimed = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(reclaimed.job_id, job.job_id);
    assert_eq!(reclaimed.attempts, 2);
}

#[tokio::test]
async fn test_recover_with_nothing_running() {
    let env = test_env(fast_config("1111")).await;
    assert_eq!(env.state.queue.recover_interrupted().await.unwrap(), 0);
}

#[tokio::test]
async fn test_queue_survives_reopening_database() {
    let env = test_env(fast_config("1111")).await;
    let job = env
        .state
        .queue
        .enqueue(ContentHandle::new(), &alice())
        .await
        .unwrap();
    env.state.db.close().await;

    let pool = pcv_common::db::init_database(&env.temp_dir.path().join("test_pcv.db"))
        .await
        .unwrap();
    let queue = pcv_server::queue::JobQueue::new(pool);

    let claimed = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.job_id, job.job_id);
}
