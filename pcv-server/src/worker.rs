//! Worker pool
//!
//! A fixed number of tokio tasks pull jobs from the [`JobQueue`] and run them.
//! Idle workers park on the queue's wakeup signal, with a poll interval as a
//! backstop for jobs whose retry delay has expired.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::{JobOutcome, SubmissionJob, VerificationRunner};
use crate::queue::JobQueue;
use crate::stats::PipelineStats;

/// Upper bound on the delay between attempts of one job
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Worker pool tuning
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub worker_count: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub poll_interval: Duration,
}

/// Delay before retrying after `attempt` failed: `base * 2^(attempt-1)`, capped
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(MAX_RETRY_DELAY)
}

/// Running worker tasks
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        queue: JobQueue,
        runner: Arc<VerificationRunner>,
        stats: Arc<PipelineStats>,
        settings: WorkerSettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let count = settings.worker_count.max(1);

        let handles = (0..count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: queue.clone(),
                    runner: Arc::clone(&runner),
                    stats: Arc::clone(&stats),
                    settings: settings.clone(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(workers = count, "Verification workers started");
        Self { cancel, handles }
    }

    /// Stop claiming new jobs and wait for in-flight attempts to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Verification worker panicked: {}", e);
            }
        }
        info!("Verification workers stopped");
    }
}

struct Worker {
    id: usize,
    queue: JobQueue,
    runner: Arc<VerificationRunner>,
    stats: Arc<PipelineStats>,
    settings: WorkerSettings,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "Worker started");

        while !self.cancel.is_cancelled() {
            match self.queue.claim_next().await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => self.idle().await,
                Err(e) => {
                    error!(worker = self.id, "Failed to claim job: {}", e);
                    self.idle().await;
                }
            }
        }

        debug!(worker = self.id, "Worker exiting");
    }

    async fn idle(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.queue.wait_for_work() => {}
            _ = tokio::time::sleep(self.settings.poll_interval) => {}
        }
    }

    async fn process(&self, mut job: SubmissionJob) {
        let job_id = job.job_id;
        debug!(worker = self.id, %job_id, attempt = job.attempts, "Claimed job");

        let settled = match self.runner.run(&mut job).await {
            Ok(JobOutcome::Completed { .. }) => {
                self.stats.record_completed();
                self.queue.complete(job_id).await
            }
            Ok(JobOutcome::Dropped { reason }) => self.queue.fail(job_id, &reason).await,
            Err(e) if job.attempts >= self.settings.max_attempts => {
                error!(
                    %job_id,
                    attempts = job.attempts,
                    "Giving up on job: {}",
                    e
                );
                self.stats.record_failed();
                self.queue.fail(job_id, &e.to_string()).await
            }
            Err(e) => {
                let delay = retry_delay(self.settings.retry_backoff, job.attempts);
                warn!(
                    %job_id,
                    attempt = job.attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "Job attempt failed, will retry: {}",
                    e
                );
                self.stats.record_retried();
                self.queue.retry_later(job_id, &e.to_string(), delay).await
            }
        };

        if let Err(e) = settled {
            // The job stays `running` and is requeued on next startup
            error!(%job_id, "Failed to record job state: {}", e);
        }
    }
}
