//! Submission entry point
//!
//! Turns an uploaded file reference plus the caller's identity into a queued
//! verification job. Returns as soon as the job is durable; verification
//! happens later on a worker.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use pcv_common::db::UserIdentity;

use crate::content::ContentHandle;
use crate::queue::JobQueue;
use crate::stats::PipelineStats;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The request carried no file
    #[error("No file was uploaded")]
    NoContent,

    #[error("Failed to enqueue verification job: {0}")]
    Queue(#[from] pcv_common::Error),
}

#[derive(Clone)]
pub struct SubmissionService {
    queue: JobQueue,
    stats: Arc<PipelineStats>,
}

impl SubmissionService {
    pub fn new(queue: JobQueue, stats: Arc<PipelineStats>) -> Self {
        Self { queue, stats }
    }

    /// Enqueue verification of `content` on behalf of `user`.
    ///
    /// Nothing is enqueued when `content` is `None`.
    pub async fn submit(
        &self,
        content: Option<ContentHandle>,
        user: &UserIdentity,
    ) -> Result<Uuid, SubmitError> {
        let handle = content.ok_or(SubmitError::NoContent)?;
        let job = self.queue.enqueue(handle, user).await?;
        self.stats.record_enqueued();

        info!(
            job_id = %job.job_id,
            handle = %handle,
            user = %user.email,
            "Verification job enqueued"
        );
        Ok(job.job_id)
    }
}
