use std::sync::Arc;

use research_core::{
    detect_sections, JobCost, ResearchLimits, ResearchMemory, SegmentId, StopReason, TokenUsage,
};
use research_logging::{research_debug, research_error, research_info, research_warn};
use thiserror::Error;

use crate::inference::InferenceError;
use crate::prompts;
use crate::store::EvidenceStore;
use crate::throttle::{MeteredCompletion, ThrottledInference};

/// Unrecoverable coordinator failures. Each one fails the job.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("research plan creation failed: {0}")]
    Plan(#[source] InferenceError),
    #[error("batch assessment failed: {0}")]
    Assessment(#[source] InferenceError),
    #[error("final summary generation failed: {0}")]
    Summary(#[source] InferenceError),
}

/// Advisory result of recording a segment failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSignal {
    Continue,
    /// Failures exceed the configured threshold; the run may need a different strategy.
    AdjustStrategy { failures: usize },
}

/// Owns the research plan and the run's working memory.
///
/// Workers never touch the memory; they hand their results back and the
/// coordinator folds them in.
pub struct LeadCoordinator {
    inference: Arc<ThrottledInference>,
    limits: ResearchLimits,
    summary_evidence_limit: usize,
    memory: ResearchMemory,
    query: String,
}

impl LeadCoordinator {
    pub fn new(
        inference: Arc<ThrottledInference>,
        limits: ResearchLimits,
        highlight_capacity: usize,
        summary_evidence_limit: usize,
    ) -> Self {
        Self {
            inference,
            limits,
            summary_evidence_limit,
            memory: ResearchMemory::new(highlight_capacity),
            query: String::new(),
        }
    }

    pub fn memory(&self) -> &ResearchMemory {
        &self.memory
    }

    pub fn limits(&self) -> &ResearchLimits {
        &self.limits
    }

    /// Starts a fresh run: memory is reset and sized for `total_pages`.
    pub fn begin(&mut self, query: &str, total_pages: usize) {
        self.query = query.to_string();
        self.memory.reset(total_pages);
    }

    pub async fn create_research_plan(
        &mut self,
        query: &str,
        total_pages: usize,
    ) -> Result<String, CoordinatorError> {
        self.query = query.to_string();
        self.memory.set_total_pages(total_pages);
        let completion = self
            .inference
            .call(&prompts::plan_prompt(query, total_pages))
            .await
            .map_err(CoordinatorError::Plan)?;
        self.record_completion(&completion);
        let plan = completion.text.trim().to_string();
        self.memory.update_plan(plan.clone());
        research_debug!("research plan created ({} chars)", plan.len());
        Ok(plan)
    }

    /// Accounts for a call made on the coordinator's behalf by a worker.
    pub fn record_call(&mut self, usage: TokenUsage, cost: f64) {
        self.memory.record_cost(usage, cost);
    }

    /// Folds a batch into memory, then asks the model to assess it.
    ///
    /// Memory updates happen before the call, so a failed assessment leaves
    /// them intact.
    pub async fn process_batch_results(
        &mut self,
        results: &[(SegmentId, String)],
    ) -> Result<String, CoordinatorError> {
        for (segment_id, analysis) in results {
            self.memory.add_page_completion(
                segment_id.clone(),
                analysis,
                detect_sections(analysis),
            );
        }
        if results.is_empty() {
            return Ok(String::from("no segment in this batch produced evidence"));
        }

        let prompt = prompts::batch_assessment_prompt(
            &self.query,
            &self.memory.get_progress_header(),
            results,
        );
        let completion = self
            .inference
            .call(&prompt)
            .await
            .map_err(CoordinatorError::Assessment)?;
        self.record_completion(&completion);
        Ok(completion.text.trim().to_string())
    }

    /// Stop condition for the cost so far, if any; checked before every batch.
    pub fn evaluate_stop(&self, cost_so_far: &JobCost) -> Option<StopReason> {
        self.limits.evaluate(
            self.memory.completed_pages(),
            self.memory.total_pages(),
            cost_so_far,
        )
    }

    pub fn should_continue(&self, cost_so_far: &JobCost) -> bool {
        self.evaluate_stop(cost_so_far).is_none()
    }

    /// Never fails because of the store: missing or unreadable evidence
    /// yields a degraded summary without a model call.
    pub async fn generate_final_summary(
        &mut self,
        store: &dyn EvidenceStore,
        job_id: &str,
    ) -> Result<String, CoordinatorError> {
        let header = self.memory.get_progress_header();
        let evidence = match store.get_all_evidence(job_id) {
            Ok(records) => records,
            Err(err) => {
                research_error!(
                    "job_id={} evidence unavailable for final summary: {}",
                    job_id,
                    err
                );
                return Ok(degraded_summary(&header, "the evidence store could not be read"));
            }
        };
        if evidence.is_empty() {
            research_warn!("job_id={} no evidence saved; summary is degraded", job_id);
            return Ok(degraded_summary(&header, "no segment produced evidence"));
        }

        let excerpts: Vec<(SegmentId, String)> = evidence
            .into_iter()
            .take(self.summary_evidence_limit.max(1))
            .map(|record| (record.segment_id, record.content))
            .collect();
        let prompt = prompts::summary_prompt(&self.query, &header, &excerpts);
        let completion = self
            .inference
            .call(&prompt)
            .await
            .map_err(CoordinatorError::Summary)?;
        self.record_completion(&completion);
        research_info!(
            "job_id={} final summary generated from {} evidence record(s)",
            job_id,
            excerpts.len()
        );
        Ok(completion.text.trim().to_string())
    }

    pub fn handle_failure(&mut self, segment_id: SegmentId, error: &str) -> FailureSignal {
        self.memory.add_page_failure(segment_id, error);
        let failures = self.memory.failed_pages().len();
        if failures > self.limits.failure_threshold {
            FailureSignal::AdjustStrategy { failures }
        } else {
            FailureSignal::Continue
        }
    }

    fn record_completion(&mut self, completion: &MeteredCompletion) {
        self.memory.record_cost(completion.usage, completion.cost);
    }
}

fn degraded_summary(header: &str, cause: &str) -> String {
    format!(
        "No evidence is available for a summary: {cause}.\n\n{}",
        header.trim_end()
    )
}
