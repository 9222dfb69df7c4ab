//! Verification job
//!
//! A job moves through `Queued -> Running -> {Completed, Failed}`. While
//! running it fetches the raw upload, expands it, fingerprints and scores the
//! expansion, waits the configured artificial delay, appends the result, and
//! pushes it to the submitter's live session.
//!
//! The job body may run more than once for the same job (the queue redelivers
//! after transient failures or a crash). Persistence is keyed by job id, so a
//! rerun finds the earlier record instead of adding a second one.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pcv_common::db::{ResultRecord, UserIdentity};
use pcv_common::events::{DeliveryOutcome, PcvEvent, SessionChannels};
use pcv_common::time;

use crate::content::{ContentHandle, ContentStore};
use crate::fingerprint::Verifier;
use crate::grammar;
use crate::results::{PersistOutcome, ResultStore};
use crate::stats::PipelineStats;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Column value in `verification_jobs.state`
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// `Running -> Queued` is the queue handing a job back for another attempt
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Failed)
                | (JobState::Running, JobState::Queued)
        )
    }
}

impl FromStr for JobState {
    type Err = pcv_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            other => Err(pcv_common::Error::Internal(format!("Unknown job state: {}", other))),
        }
    }
}

/// One submitted upload waiting for (or undergoing) verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionJob {
    pub job_id: Uuid,
    pub content_handle: ContentHandle,
    pub user: UserIdentity,
    pub state: JobState,
    /// Attempts started so far, including the current one
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl SubmissionJob {
    pub fn new(content_handle: ContentHandle, user: UserIdentity) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            content_handle,
            user,
            state: JobState::Queued,
            attempts: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition_to(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                job_id: self.job_id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Errors that end a job attempt without settling the job.
///
/// The queue decides whether to retry.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {job_id}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobState,
        to: JobState,
    },

    #[error("Failed to persist result: {0}")]
    Persist(#[source] pcv_common::Error),

    #[error("Verification task aborted: {0}")]
    Aborted(String),
}

/// How a job attempt settled
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// A result exists for the job (new or from an earlier attempt)
    Completed {
        record: ResultRecord,
        persisted: PersistOutcome,
        delivery: DeliveryOutcome,
    },
    /// Content could not be retrieved; no result was produced
    Dropped { reason: String },
}

/// Executes verification jobs
pub struct VerificationRunner {
    content: Arc<dyn ContentStore>,
    results: ResultStore,
    sessions: SessionChannels,
    verifier: Verifier,
    delay: Duration,
    stats: Arc<PipelineStats>,
}

impl VerificationRunner {
    pub fn new(
        content: Arc<dyn ContentStore>,
        results: ResultStore,
        sessions: SessionChannels,
        verifier: Verifier,
        delay: Duration,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            content,
            results,
            sessions,
            verifier,
            delay,
            stats,
        }
    }

    /// Run one attempt of `job`, which must already be `Running`.
    ///
    /// On `Ok` the job is terminal. On `Err` it is still `Running` and the
    /// caller hands it back to the queue.
    pub async fn run(&self, job: &mut SubmissionJob) -> Result<JobOutcome, JobError> {
        if job.state != JobState::Running {
            return Err(JobError::InvalidTransition {
                job_id: job.job_id,
                from: job.state,
                to: JobState::Running,
            });
        }

        let raw = match self.content.fetch(&job.content_handle).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    job_id = %job.job_id,
                    handle = %job.content_handle,
                    error = %e,
                    "Content retrieval failed, dropping job without a result"
                );
                self.stats.record_dropped();
                job.transition_to(JobState::Failed)?;
                return Ok(JobOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };

        // Expansion is exponential in the worst case; keep it off the async workers
        let raw_byte_length = raw.len();
        let verifier = self.verifier.clone();
        let verification = tokio::task::spawn_blocking(move || {
            let compact = String::from_utf8_lossy(&raw);
            let expanded = grammar::expand(&compact);
            verifier.verify(&expanded, raw_byte_length)
        })
        .await
        .map_err(|e| JobError::Aborted(e.to_string()))?;

        let record = ResultRecord {
            id: Uuid::new_v4(),
            user: job.user.email.clone(),
            score: verification.score,
            // Stored with microsecond precision; keep the pushed copy identical
            submitted_at: time::now().trunc_subsecs(6),
            fingerprint: verification.hash,
        };

        debug!(
            job_id = %job.job_id,
            matched = verification.matched,
            expected = self.verifier.expected(),
            score = record.score,
            delay_ms = self.delay.as_millis() as u64,
            "Verification computed, applying processing delay"
        );
        tokio::time::sleep(self.delay).await;

        let persisted = self
            .results
            .insert(job.job_id, &record)
            .await
            .map_err(JobError::Persist)?;

        let record = match &persisted {
            PersistOutcome::Inserted => record,
            PersistOutcome::AlreadyRecorded(existing) => {
                info!(job_id = %job.job_id, "Result already recorded by an earlier attempt");
                self.stats.record_duplicate();
                existing.clone()
            }
        };

        let delivery = self
            .sessions
            .deliver(
                &job.user.id,
                PcvEvent::VerificationCompleted {
                    result: record.clone(),
                },
            )
            .await;
        self.stats
            .record_delivery(matches!(delivery, DeliveryOutcome::Delivered(_)));
        debug!(job_id = %job.job_id, ?delivery, "Live delivery attempted");

        job.transition_to(JobState::Completed)?;
        info!(
            job_id = %job.job_id,
            user = %record.user,
            score = record.score,
            "Verification job completed"
        );

        Ok(JobOutcome::Completed {
            record,
            persisted,
            delivery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> SubmissionJob {
        SubmissionJob::new(
            ContentHandle::new(),
            UserIdentity {
                id: "u1".to_string(),
                email: "a@example.com".to_string(),
            },
        )
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        job.transition_to(JobState::Running).unwrap();
        job.transition_to(JobState::Completed).unwrap();
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut job = job();
        let err = job.transition_to(JobState::Completed).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobState::Completed, JobState::Failed] {
            for next in [JobState::Queued, JobState::Running, JobState::Completed, JobState::Failed] {
                assert!(!terminal.can_transition_to(next), "{:?} -> {:?}", terminal, next);
            }
        }
    }

    #[test]
    fn test_running_job_can_be_requeued() {
        let mut job = job();
        job.transition_to(JobState::Running).unwrap();
        job.transition_to(JobState::Queued).unwrap();
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [JobState::Queued, JobState::Running, JobState::Completed, JobState::Failed] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("paused".parse::<JobState>().is_err());
    }
}
