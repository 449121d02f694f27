use std::sync::Arc;

use chrono::Utc;
use research_core::ResearchJob;
use research_logging::research_info;

use crate::content::SegmentContentProvider;
use crate::dispatcher::{BatchDispatcher, DispatchError, JobOutcome};
use crate::events::ProgressSink;
use crate::inference::InferenceBackend;
use crate::rate_limit::RateLimiter;
use crate::report::ResearchReport;
use crate::settings::{ResearchSettings, RunOverrides, SettingsError};
use crate::store::{EvidenceStore, StoreError};
use crate::throttle::ThrottledInference;

/// A research job as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Generated when absent.
    pub job_id: Option<String>,
    pub document_id: String,
    pub query: String,
    pub index_id: String,
    pub overrides: RunOverrides,
}

/// Entry point for research jobs: creates them, runs them and answers status queries.
///
/// All collaborators are injected. The rate limiter inside the throttled
/// inference is shared by every job this engine runs.
pub struct ResearchEngine {
    store: Arc<dyn EvidenceStore>,
    provider: Arc<dyn SegmentContentProvider>,
    inference: Arc<ThrottledInference>,
    settings: ResearchSettings,
    sink: Arc<dyn ProgressSink>,
}

impl ResearchEngine {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        provider: Arc<dyn SegmentContentProvider>,
        inference: Arc<ThrottledInference>,
        settings: ResearchSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            provider,
            inference,
            settings,
            sink,
        }
    }

    /// Wires a backend behind a fresh rate limiter built from `settings`.
    pub fn with_backend(
        store: Arc<dyn EvidenceStore>,
        provider: Arc<dyn SegmentContentProvider>,
        backend: Arc<dyn InferenceBackend>,
        settings: ResearchSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, DispatchError> {
        settings.validate().map_err(invalid_settings)?;
        let limiter = RateLimiter::from_settings(&settings.rate_limit)
            .map_err(|err| DispatchError::InvalidInput(err.to_string()))?;
        let inference = ThrottledInference::new(
            backend,
            Arc::new(limiter),
            settings.call_timeout,
            settings.pricing,
        );
        Ok(Self::new(
            store,
            provider,
            Arc::new(inference),
            settings,
            sink,
        ))
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn EvidenceStore> {
        &self.store
    }

    /// Validates and records the job, then runs it to a terminal state.
    ///
    /// Invalid requests are rejected before any record is written.
    pub async fn submit(&self, request: JobRequest) -> Result<JobOutcome, DispatchError> {
        let job = self.create_job(&request)?;
        let settings = self.run_settings(&request.overrides)?;
        research_info!(
            "job_id={} submitted document={} index={} batch_size={} concurrency={}",
            job.job_id,
            job.document_id,
            job.index_id,
            settings.effective_batch_size(),
            settings.concurrency()
        );
        BatchDispatcher::new(
            self.store.as_ref(),
            self.provider.as_ref(),
            self.inference.clone(),
            &settings,
            self.sink.as_ref(),
        )
        .run(&job.job_id)
        .await
    }

    /// Writes a queued job record; nothing runs yet.
    pub fn create_job(&self, request: &JobRequest) -> Result<ResearchJob, DispatchError> {
        let document_id = require("document id", &request.document_id)?;
        let query = require("query", &request.query)?;
        let index_id = require("index id", &request.index_id)?;
        let job_id = match &request.job_id {
            Some(job_id) => require("job id", job_id)?,
            None => generate_job_id(),
        };
        self.run_settings(&request.overrides)?;

        let job = ResearchJob::new(job_id, document_id, query, index_id, Utc::now());
        self.store.create_job(&job).map_err(|err| match err {
            StoreError::AlreadyExists(job_id) => {
                DispatchError::InvalidInput(format!("job {job_id} already exists"))
            }
            other => DispatchError::Store(other),
        })?;
        Ok(job)
    }

    /// Deployment settings with the per-run overrides applied, validated as a whole.
    fn run_settings(&self, overrides: &RunOverrides) -> Result<ResearchSettings, DispatchError> {
        let settings = overrides.apply_to(&self.settings);
        settings.validate().map_err(invalid_settings)?;
        Ok(settings)
    }

    pub fn status(&self, job_id: &str, index_id: Option<&str>) -> Result<ResearchJob, StoreError> {
        self.store.get_job_in_scope(job_id, index_id)
    }

    pub fn list(&self) -> Result<Vec<ResearchJob>, StoreError> {
        self.store.list_jobs()
    }

    pub fn report(&self, job_id: &str) -> Result<Option<ResearchReport>, StoreError> {
        self.store.load_report(job_id)
    }
}

pub fn generate_job_id() -> String {
    format!("research-{}", uuid::Uuid::new_v4().simple())
}

fn require(field: &str, value: &str) -> Result<String, DispatchError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::InvalidInput(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn invalid_settings(err: SettingsError) -> DispatchError {
    DispatchError::InvalidInput(err.to_string())
}
