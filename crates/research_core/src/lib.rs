//! Research core: pure domain types, bounded research memory and stop policy.
mod cost;
mod evidence;
mod job;
mod memory;
mod policy;
mod segment;
mod text;

pub use cost::{CostTracker, Pricing, TokenUsage};
pub use evidence::{EvidenceRecord, FailedPage, Highlight};
pub use job::{
    percentage, JobCost, JobId, JobProgress, JobStatus, JobUpdate, ResearchJob, TransitionError,
};
pub use memory::{
    HighlightRing, ResearchMemory, DEFAULT_HIGHLIGHT_CAPACITY, HEADER_HIGHLIGHTS,
    MAX_FAILURE_CHARS, MAX_HIGHLIGHT_CHARS,
};
pub use policy::{ResearchLimits, StopReason};
pub use segment::SegmentId;
pub use text::{detect_sections, normalize_content, truncate_chars};
