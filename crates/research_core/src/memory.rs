use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::cost::{CostTracker, TokenUsage};
use crate::evidence::{FailedPage, Highlight};
use crate::job::{JobCost, JobProgress};
use crate::text::truncate_chars;
use crate::SegmentId;

pub const DEFAULT_HIGHLIGHT_CAPACITY: usize = 5;
pub const MAX_HIGHLIGHT_CHARS: usize = 200;
pub const MAX_FAILURE_CHARS: usize = 100;
/// Highlights rendered into the progress header.
pub const HEADER_HIGHLIGHTS: usize = 3;

/// Fixed-capacity ring of highlights; pushing into a full ring overwrites the oldest.
#[derive(Debug, Clone)]
pub struct HighlightRing {
    slots: Box<[Option<Highlight>]>,
    /// Index the next push writes to.
    head: usize,
    len: usize,
}

impl HighlightRing {
    /// A zero capacity is bumped to one so the ring can always hold the latest entry.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `highlight`, returning the evicted oldest entry when full.
    pub fn push(&mut self, highlight: Highlight) -> Option<Highlight> {
        let evicted = self.slots[self.head].replace(highlight);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        evicted
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Highlight> + '_ {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |offset| self.slots[(start + offset) % capacity].as_ref())
    }

    /// The newest `n` entries, oldest first.
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &Highlight> + '_ {
        let skip = self.len.saturating_sub(n);
        self.iter().skip(skip)
    }
}

/// Bounded working context for one research run.
///
/// Rebuilt at every run start; durable state lives in the evidence store.
#[derive(Debug, Clone)]
pub struct ResearchMemory {
    plan: Option<String>,
    total_pages: usize,
    completed: BTreeSet<SegmentId>,
    highlights: HighlightRing,
    failed_pages: Vec<FailedPage>,
    section_map: BTreeMap<SegmentId, Vec<String>>,
    cost: CostTracker,
}

impl Default for ResearchMemory {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_CAPACITY)
    }
}

impl ResearchMemory {
    pub fn new(highlight_capacity: usize) -> Self {
        Self {
            plan: None,
            total_pages: 0,
            completed: BTreeSet::new(),
            highlights: HighlightRing::with_capacity(highlight_capacity),
            failed_pages: Vec::new(),
            section_map: BTreeMap::new(),
            cost: CostTracker::new(),
        }
    }

    /// Drops all state; equivalent to fresh construction with the same capacity.
    pub fn reset(&mut self, total_pages: usize) {
        *self = Self::new(self.highlights.capacity());
        self.total_pages = total_pages;
    }

    pub fn set_total_pages(&mut self, total_pages: usize) {
        self.total_pages = total_pages;
    }

    pub fn update_plan(&mut self, plan: impl Into<String>) {
        self.plan = Some(plan.into());
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    /// Records a successful segment. A segment completing twice counts once.
    pub fn add_page_completion(
        &mut self,
        segment_id: SegmentId,
        summary: &str,
        sections: Vec<String>,
    ) {
        self.completed.insert(segment_id.clone());
        if !sections.is_empty() {
            self.section_map.insert(segment_id.clone(), sections);
        }
        self.highlights.push(Highlight {
            segment_id,
            summary: truncate_chars(summary, MAX_HIGHLIGHT_CHARS),
        });
    }

    pub fn add_page_failure(&mut self, segment_id: SegmentId, error: &str) {
        self.failed_pages.push(FailedPage {
            segment_id,
            error: truncate_chars(error, MAX_FAILURE_CHARS),
        });
    }

    pub fn record_cost(&mut self, usage: TokenUsage, cost: f64) {
        self.cost.record(usage, cost);
    }

    pub fn completed_pages(&self) -> usize {
        self.completed.len().min(self.total_pages)
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress::new(self.completed_pages(), self.total_pages)
    }

    pub fn failed_pages(&self) -> &[FailedPage] {
        &self.failed_pages
    }

    pub fn section_map(&self) -> &BTreeMap<SegmentId, Vec<String>> {
        &self.section_map
    }

    pub fn highlights(&self) -> &HighlightRing {
        &self.highlights
    }

    pub fn get_cost_summary(&self) -> JobCost {
        self.cost.summary()
    }

    pub fn llm_calls(&self) -> u64 {
        self.cost.calls()
    }

    /// Compact, deterministic context block fed back into later model calls.
    pub fn get_progress_header(&self) -> String {
        let progress = self.progress();
        let mut header = String::new();
        let _ = writeln!(
            header,
            "Research progress: {:.1}% ({}/{} pages analyzed, {} failed)",
            progress.percentage,
            progress.completed_pages,
            progress.total_pages,
            self.failed_pages.len()
        );
        if self.highlights.is_empty() {
            header.push_str("Recent findings: none yet\n");
        } else {
            header.push_str("Recent findings:\n");
            for highlight in self.highlights.latest(HEADER_HIGHLIGHTS) {
                let _ = writeln!(header, "- [{}] {}", highlight.segment_id, highlight.summary);
            }
        }
        header
    }
}
