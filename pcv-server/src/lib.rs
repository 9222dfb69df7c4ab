//! pcv-server library interface
//!
//! Exposes the verification pipeline and the HTTP router for the binary and
//! for integration testing.

pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod fingerprint;
pub mod grammar;
pub mod job;
pub mod queue;
pub mod results;
pub mod stats;
pub mod submission;
pub mod utils;
pub mod worker;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use pcv_common::events::SessionChannels;

use crate::config::ServiceConfig;
use crate::content::ContentStore;
use crate::fingerprint::Verifier;
use crate::job::VerificationRunner;
use crate::queue::JobQueue;
use crate::results::ResultStore;
use crate::stats::PipelineStats;
use crate::submission::SubmissionService;
use crate::worker::WorkerPool;

/// Application state shared across handlers and the worker pool
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Raw upload storage
    pub content: Arc<dyn ContentStore>,
    pub results: ResultStore,
    pub queue: JobQueue,
    pub submissions: SubmissionService,
    /// Per-user live session channels
    pub sessions: SessionChannels,
    pub stats: Arc<PipelineStats>,
    pub config: Arc<ServiceConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, content: Arc<dyn ContentStore>, config: ServiceConfig) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let queue = JobQueue::new(db.clone());

        Self {
            results: ResultStore::new(db.clone()),
            submissions: SubmissionService::new(queue.clone(), Arc::clone(&stats)),
            queue,
            db,
            content,
            sessions: SessionChannels::default(),
            stats,
            config: Arc::new(config),
            startup_time: Utc::now(),
        }
    }

    /// Job executor wired to this state's stores and channels
    pub fn verification_runner(&self) -> VerificationRunner {
        VerificationRunner::new(
            Arc::clone(&self.content),
            self.results.clone(),
            self.sessions.clone(),
            Verifier::new(self.config.pipeline.expected_fingerprint.clone()),
            self.config.verification_delay(),
            Arc::clone(&self.stats),
        )
    }

    /// Start the configured number of verification workers
    pub fn spawn_workers(&self) -> WorkerPool {
        WorkerPool::spawn(
            self.queue.clone(),
            Arc::new(self.verification_runner()),
            Arc::clone(&self.stats),
            self.config.worker_settings(),
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        // UI routes (HTML pages)
        .merge(api::ui_routes())
        // API routes
        .merge(api::upload_routes())
        .merge(api::score_routes())
        .merge(api::content_routes())
        .route("/events", get(api::session_events))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
