use research_core::{JobCost, JobId, JobProgress, JobStatus, SegmentId, StopReason};
use research_logging::{research_debug, research_info, research_warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    JobStarted {
        job_id: JobId,
        total_pages: usize,
    },
    BatchStarted {
        job_id: JobId,
        batch_index: usize,
        batch_count: usize,
        size: usize,
    },
    SegmentCompleted {
        job_id: JobId,
        segment_id: SegmentId,
    },
    SegmentFailed {
        job_id: JobId,
        segment_id: SegmentId,
        error: String,
    },
    BatchCompleted {
        job_id: JobId,
        batch_index: usize,
        progress: JobProgress,
        cost: JobCost,
    },
    Stopped {
        job_id: JobId,
        reason: StopReason,
    },
    JobFinished {
        job_id: JobId,
        status: JobStatus,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ResearchEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _event: ResearchEvent) {}
}

/// Forwards progress to the log at the level each event deserves.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: ResearchEvent) {
        match event {
            ResearchEvent::JobStarted {
                job_id,
                total_pages,
            } => research_info!("job_id={} started total_pages={}", job_id, total_pages),
            ResearchEvent::BatchStarted {
                job_id,
                batch_index,
                batch_count,
                size,
            } => research_info!(
                "job_id={} batch {}/{} dispatching {} segment(s)",
                job_id,
                batch_index + 1,
                batch_count,
                size
            ),
            ResearchEvent::SegmentCompleted { job_id, segment_id } => {
                research_debug!("job_id={} segment={} analyzed", job_id, segment_id)
            }
            ResearchEvent::SegmentFailed {
                job_id,
                segment_id,
                error,
            } => research_warn!("job_id={} segment={} failed: {}", job_id, segment_id, error),
            ResearchEvent::BatchCompleted {
                job_id,
                batch_index,
                progress,
                cost,
            } => research_info!(
                "job_id={} batch {} done progress={:.1}% ({}/{}) input_tokens={} cost=${:.4}",
                job_id,
                batch_index + 1,
                progress.percentage,
                progress.completed_pages,
                progress.total_pages,
                cost.input_tokens,
                cost.total_cost
            ),
            ResearchEvent::Stopped { job_id, reason } => {
                if reason.is_early() {
                    research_warn!("job_id={} stopping early: {}", job_id, reason);
                } else {
                    research_info!("job_id={} stopping: {}", job_id, reason);
                }
            }
            ResearchEvent::JobFinished { job_id, status } => {
                research_info!("job_id={} finished status={}", job_id, status)
            }
        }
    }
}
