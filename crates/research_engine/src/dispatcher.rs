use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use research_core::{JobStatus, JobUpdate, ResearchJob, SegmentId, StopReason, TokenUsage};
use research_logging::{research_debug, research_error, research_info, research_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{ContentError, SegmentContentProvider};
use crate::coordinator::{CoordinatorError, FailureSignal, LeadCoordinator};
use crate::events::{ProgressSink, ResearchEvent};
use crate::prompts;
use crate::report::{ReportFormat, ResearchReport};
use crate::settings::ResearchSettings;
use crate::store::{EvidenceStore, StoreError};
use crate::throttle::ThrottledInference;

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("content provider failure: {0}")]
    Content(#[from] ContentError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error("job {job_id} is {status}; only queued jobs can be dispatched")]
    InvalidState { job_id: String, status: JobStatus },
}

/// Result of a finished research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job: ResearchJob,
    pub report_path: Option<PathBuf>,
    pub summary: String,
    pub stop_reason: StopReason,
    pub evidence_count: usize,
    pub failed_pages: usize,
}

impl JobOutcome {
    /// True when the stop policy ended the run before every segment was attempted.
    pub fn stopped_early(&self) -> bool {
        self.stop_reason.is_early()
    }
}

/// What a worker hands back to the coordinator for one segment.
struct SegmentOutcome {
    segment_id: SegmentId,
    metered: Option<(TokenUsage, f64)>,
    result: Result<String, String>,
}

/// Runs one job through its lifecycle: batches of segments, a bounded
/// number in flight, stop policy checked between batches.
pub struct BatchDispatcher<'a> {
    store: &'a dyn EvidenceStore,
    provider: &'a dyn SegmentContentProvider,
    inference: Arc<ThrottledInference>,
    settings: &'a ResearchSettings,
    sink: &'a dyn ProgressSink,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(
        store: &'a dyn EvidenceStore,
        provider: &'a dyn SegmentContentProvider,
        inference: Arc<ThrottledInference>,
        settings: &'a ResearchSettings,
        sink: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            store,
            provider,
            inference,
            settings,
            sink,
        }
    }

    /// Drives a queued job to `completed` or `failed`.
    ///
    /// On failure the job record is marked failed with the error text and
    /// the progress and cost reached so far, then the error is returned.
    pub async fn run(&self, job_id: &str) -> Result<JobOutcome, DispatchError> {
        let job = self.store.get_job(job_id)?;
        if job.status != JobStatus::Queued {
            return Err(DispatchError::InvalidState {
                job_id: job.job_id,
                status: job.status,
            });
        }

        let mut coordinator = LeadCoordinator::new(
            self.inference.clone(),
            self.settings.limits,
            self.settings.highlight_capacity,
            self.settings.summary_evidence_limit,
        );
        match self.execute(&job, &mut coordinator).await {
            Ok(outcome) => {
                self.sink.emit(ResearchEvent::JobFinished {
                    job_id: job.job_id.clone(),
                    status: JobStatus::Completed,
                });
                Ok(outcome)
            }
            Err(err) => {
                research_error!("job_id={} failed: {}", job.job_id, err);
                self.mark_failed(&job.job_id, &err, &coordinator).await;
                self.sink.emit(ResearchEvent::JobFinished {
                    job_id: job.job_id.clone(),
                    status: JobStatus::Failed,
                });
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        job: &ResearchJob,
        coordinator: &mut LeadCoordinator,
    ) -> Result<JobOutcome, DispatchError> {
        let job_id = job.job_id.as_str();
        self.update_with_retry(job_id, &JobUpdate::status(JobStatus::Running))
            .await?;

        let segments = self.provider.list_segments(&job.document_id).await?;
        let total = segments.len();
        coordinator.begin(&job.query, total);
        self.update_with_retry(
            job_id,
            &JobUpdate::default().with_progress(coordinator.memory().progress()),
        )
        .await?;
        self.sink.emit(ResearchEvent::JobStarted {
            job_id: job_id.to_string(),
            total_pages: total,
        });

        if total == 0 {
            research_warn!(
                "job_id={} document {} has no segments",
                job_id,
                job.document_id
            );
        } else {
            coordinator.create_research_plan(&job.query, total).await?;
        }

        let batch_size = self.settings.effective_batch_size();
        let batch_count = total.div_ceil(batch_size);
        let mut early_stop = None;
        for (batch_index, batch) in segments.chunks(batch_size).enumerate() {
            let cost = coordinator.memory().get_cost_summary();
            if let Some(reason) = coordinator.evaluate_stop(&cost) {
                early_stop = Some(reason);
                break;
            }
            self.sink.emit(ResearchEvent::BatchStarted {
                job_id: job_id.to_string(),
                batch_index,
                batch_count,
                size: batch.len(),
            });
            self.run_batch(job, batch, coordinator).await?;

            let memory = coordinator.memory();
            let progress = memory.progress();
            let cost = memory.get_cost_summary();
            self.update_with_retry(
                job_id,
                &JobUpdate::default().with_progress(progress).with_cost(cost),
            )
            .await?;
            self.sink.emit(ResearchEvent::BatchCompleted {
                job_id: job_id.to_string(),
                batch_index,
                progress,
                cost,
            });
        }

        let memory = coordinator.memory();
        let stop_reason = early_stop.unwrap_or_else(|| {
            if memory.completed_pages() >= memory.total_pages() {
                StopReason::AllPagesProcessed
            } else {
                StopReason::BatchesExhausted
            }
        });
        self.sink.emit(ResearchEvent::Stopped {
            job_id: job_id.to_string(),
            reason: stop_reason.clone(),
        });

        let summary = coordinator
            .generate_final_summary(self.store, job_id)
            .await?;
        self.finish(job, coordinator, summary, stop_reason).await
    }

    /// Analyzes one batch with at most `concurrency()` segments in flight,
    /// then folds every outcome into the coordinator.
    async fn run_batch(
        &self,
        job: &ResearchJob,
        batch: &[SegmentId],
        coordinator: &mut LeadCoordinator,
    ) -> Result<(), DispatchError> {
        let memory = coordinator.memory();
        let header = memory.get_progress_header();
        let plan = memory.plan().map(str::to_owned);

        let outcomes: Vec<SegmentOutcome> = stream::iter(batch.iter().cloned())
            .map(|segment_id| self.analyze_segment(job, plan.as_deref(), &header, segment_id))
            .buffer_unordered(self.settings.concurrency())
            .collect()
            .await;

        let mut successes = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some((usage, cost)) = outcome.metered {
                coordinator.record_call(usage, cost);
            }
            match outcome.result {
                Ok(analysis) => {
                    self.sink.emit(ResearchEvent::SegmentCompleted {
                        job_id: job.job_id.clone(),
                        segment_id: outcome.segment_id.clone(),
                    });
                    successes.push((outcome.segment_id, analysis));
                }
                Err(error) => {
                    self.sink.emit(ResearchEvent::SegmentFailed {
                        job_id: job.job_id.clone(),
                        segment_id: outcome.segment_id.clone(),
                        error: error.clone(),
                    });
                    if let FailureSignal::AdjustStrategy { failures } =
                        coordinator.handle_failure(outcome.segment_id, &error)
                    {
                        research_warn!(
                            "job_id={} {} segment failures exceed the threshold of {}; consider adjusting the run",
                            job.job_id,
                            failures,
                            coordinator.limits().failure_threshold
                        );
                    }
                }
            }
        }
        successes.sort_by(|a, b| a.0.cmp(&b.0));

        let assessment = coordinator.process_batch_results(&successes).await?;
        research_debug!("job_id={} batch assessment: {}", job.job_id, assessment);
        Ok(())
    }

    /// One worker task. Never fails the batch: every error becomes a segment failure.
    async fn analyze_segment(
        &self,
        job: &ResearchJob,
        plan: Option<&str>,
        header: &str,
        segment_id: SegmentId,
    ) -> SegmentOutcome {
        let content = match self
            .provider
            .fetch_segment(&job.document_id, &segment_id)
            .await
        {
            Ok(content) => content,
            Err(err) => {
                return SegmentOutcome {
                    segment_id,
                    metered: None,
                    result: Err(format!("content unavailable: {err}")),
                }
            }
        };

        let prompt = prompts::segment_prompt(&job.query, plan, header, &segment_id, &content);
        let completion = match self.inference.call(&prompt).await {
            Ok(completion) => completion,
            Err(err) => {
                return SegmentOutcome {
                    segment_id,
                    metered: None,
                    result: Err(err.to_string()),
                }
            }
        };
        let metered = Some((completion.usage, completion.cost));

        let result = match self
            .store
            .save_segment_evidence(&job.job_id, &segment_id, &completion.text)
        {
            Ok(record) => {
                research_debug!(
                    "job_id={} segment={} evidence saved hash={}",
                    job.job_id,
                    segment_id,
                    &record.hash[..12]
                );
                Ok(completion.text)
            }
            Err(err) => {
                research_error!(
                    "job_id={} segment={} evidence not saved: {}",
                    job.job_id,
                    segment_id,
                    err
                );
                Err(format!("evidence not saved: {err}"))
            }
        };
        SegmentOutcome {
            segment_id,
            metered,
            result,
        }
    }

    async fn finish(
        &self,
        job: &ResearchJob,
        coordinator: &LeadCoordinator,
        summary: String,
        stop_reason: StopReason,
    ) -> Result<JobOutcome, DispatchError> {
        let job_id = job.job_id.as_str();
        let memory = coordinator.memory();
        let progress = memory.progress();
        let cost = memory.get_cost_summary();
        let evidence_count = match self.store.get_all_evidence(job_id) {
            Ok(records) => records.len(),
            Err(err) => {
                research_warn!("job_id={} evidence count unavailable: {}", job_id, err);
                0
            }
        };

        let report = ResearchReport {
            job_id: job.job_id.clone(),
            document_id: job.document_id.clone(),
            query: job.query.clone(),
            index_id: job.index_id.clone(),
            status: JobStatus::Completed,
            plan: memory.plan().map(str::to_owned),
            summary: summary.clone(),
            stop_reason: Some(stop_reason.clone()),
            progress,
            cost,
            failed_pages: memory.failed_pages().to_vec(),
            sections: memory.section_map().clone(),
            evidence_count,
            generated_at: Utc::now(),
        };
        let report_path = self.store.save_report(job_id, &report, ReportFormat::Json)?;
        if let Err(err) = self.store.save_report(job_id, &report, ReportFormat::Markdown) {
            research_warn!("job_id={} markdown report not written: {}", job_id, err);
        }

        let note = completion_note(
            &stop_reason,
            progress.completed_pages,
            progress.total_pages,
            memory.failed_pages().len(),
        );
        let update = JobUpdate::status(JobStatus::Completed)
            .with_progress(progress)
            .with_cost(cost)
            .with_note(note)
            .with_report_path(report_path.clone());
        let job = self.update_with_retry(job_id, &update).await?;
        research_info!(
            "job_id={} completed: {}/{} pages, ${:.4}, report {:?}",
            job_id,
            progress.completed_pages,
            progress.total_pages,
            cost.total_cost,
            report_path
        );

        Ok(JobOutcome {
            job,
            report_path: Some(report_path),
            summary,
            stop_reason,
            evidence_count,
            failed_pages: report.failed_pages.len(),
        })
    }

    async fn mark_failed(&self, job_id: &str, err: &DispatchError, coordinator: &LeadCoordinator) {
        let still_queued =
            matches!(self.store.get_job(job_id), Ok(job) if job.status == JobStatus::Queued);
        if still_queued {
            if let Err(store_err) = self
                .update_with_retry(job_id, &JobUpdate::status(JobStatus::Running))
                .await
            {
                research_error!(
                    "job_id={} could not record failure ({}); record still shows it as queued",
                    job_id,
                    store_err
                );
                return;
            }
        }

        let memory = coordinator.memory();
        let update = JobUpdate::status(JobStatus::Failed)
            .with_error(err.to_string())
            .with_progress(memory.progress())
            .with_cost(memory.get_cost_summary());
        if let Err(store_err) = self.update_with_retry(job_id, &update).await {
            research_error!(
                "job_id={} could not record failure ({}); record may still show it as running",
                job_id,
                store_err
            );
        }
    }

    /// Job updates carry running totals, so a retried write loses nothing.
    async fn update_with_retry(
        &self,
        job_id: &str,
        update: &JobUpdate,
    ) -> Result<ResearchJob, StoreError> {
        let attempts = self.settings.store_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.update_job(job_id, update) {
                Ok(job) => return Ok(job),
                Err(err) if attempt < attempts && is_transient(&err) => {
                    research_warn!(
                        "job_id={} job update failed (attempt {}/{}): {}",
                        job_id,
                        attempt,
                        attempts,
                        err
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    research_error!("job_id={} job update failed: {}", job_id, err);
                    return Err(err);
                }
            }
        }
    }
}

fn is_transient(err: &StoreError) -> bool {
    matches!(err, StoreError::Io { .. } | StoreError::Persist(_))
}

fn completion_note(reason: &StopReason, completed: usize, total: usize, failed: usize) -> String {
    if reason.is_early() {
        format!("stopped early: {reason} after {completed}/{total} pages")
    } else {
        format!("{reason}: {completed}/{total} pages analyzed, {failed} failed")
    }
}

#[cfg(test)]
mod tests {
    use super::completion_note;
    use research_core::StopReason;

    #[test]
    fn early_stop_note_names_the_reason() {
        let note = completion_note(
            &StopReason::BudgetExceeded {
                total_cost: 10.52,
                limit: 10.0,
            },
            50,
            100,
            0,
        );
        assert_eq!(
            note,
            "stopped early: budget exceeded ($10.52 > $10.00) after 50/100 pages"
        );
    }

    #[test]
    fn full_run_note_counts_failures() {
        let note = completion_note(&StopReason::BatchesExhausted, 9, 10, 1);
        assert_eq!(note, "all batches dispatched: 9/10 pages analyzed, 1 failed");
    }
}
