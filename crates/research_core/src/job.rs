use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward-only lifecycle: queued -> running -> {completed, failed}.
    ///
    /// Re-applying the current non-terminal status is allowed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Queued) => true,
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Completed) => true,
            (JobStatus::Running, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub completed_pages: usize,
    pub total_pages: usize,
    pub percentage: f64,
}

impl JobProgress {
    /// Builds a progress value, clamping `completed` to `total`.
    pub fn new(completed_pages: usize, total_pages: usize) -> Self {
        let completed_pages = completed_pages.min(total_pages);
        Self {
            completed_pages,
            total_pages,
            percentage: percentage(completed_pages, total_pages),
        }
    }
}

/// Percentage with one decimal place; an empty document counts as 0%.
pub fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = completed as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JobCost {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
}

impl JobCost {
    /// Field-wise maximum; cost totals never go backwards.
    pub fn merge_monotonic(&self, other: &JobCost) -> JobCost {
        JobCost {
            input_tokens: self.input_tokens.max(other.input_tokens),
            output_tokens: self.output_tokens.max(other.output_tokens),
            total_cost: self.total_cost.max(other.total_cost),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchJob {
    pub job_id: JobId,
    pub document_id: String,
    pub query: String,
    pub index_id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub cost: JobCost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchJob {
    pub fn new(
        job_id: impl Into<JobId>,
        document_id: impl Into<String>,
        query: impl Into<String>,
        index_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            document_id: document_id.into(),
            query: query.into(),
            index_id: index_id.into(),
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            cost: JobCost::default(),
            error: None,
            note: None,
            report_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges a partial update into the job.
    ///
    /// Status must move forward, `completed_pages` never decreases and never
    /// exceeds `total_pages`, cost totals are merged monotonically.
    pub fn apply(&mut self, update: &JobUpdate, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(TransitionError {
                    from: self.status,
                    to: next,
                });
            }
        }

        if let Some(progress) = update.progress {
            let total = progress.total_pages;
            let completed = progress.completed_pages.max(self.progress.completed_pages);
            self.progress = JobProgress::new(completed, total);
        }
        if let Some(cost) = update.cost {
            self.cost = self.cost.merge_monotonic(&cost);
        }
        if let Some(next) = update.status {
            self.status = next;
        }
        if let Some(error) = &update.error {
            self.error = Some(error.clone());
        }
        if let Some(note) = &update.note {
            self.note = Some(note.clone());
        }
        if let Some(path) = &update.report_path {
            self.report_path = Some(path.clone());
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Partial job update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<JobProgress>,
    pub cost: Option<JobCost>,
    pub error: Option<String>,
    pub note: Option<String>,
    pub report_path: Option<PathBuf>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: JobProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cost(mut self, cost: JobCost) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_report_path(mut self, path: PathBuf) -> Self {
        self.report_path = Some(path);
        self
    }
}
