use pretty_assertions::assert_eq;
use research_core::{
    ResearchMemory, SegmentId, TokenUsage, MAX_FAILURE_CHARS, MAX_HIGHLIGHT_CHARS,
};

fn init_logging() {
    research_logging::initialize_for_tests();
}

#[test]
fn highlights_never_exceed_capacity() {
    init_logging();
    let mut memory = ResearchMemory::new(5);
    memory.reset(200);
    for page in 0..200u32 {
        memory.add_page_completion(SegmentId::Page(page), &format!("finding {page}"), vec![]);
        assert!(memory.highlights().len() <= 5);
    }
    let kept: Vec<_> = memory
        .highlights()
        .iter()
        .map(|h| h.segment_id.clone())
        .collect();
    assert_eq!(
        kept,
        (195..200u32).map(SegmentId::Page).collect::<Vec<_>>()
    );
    assert_eq!(memory.completed_pages(), 200);
}

#[test]
fn completion_records_sections_and_truncates_summary() {
    let mut memory = ResearchMemory::default();
    memory.reset(3);
    let long = "x".repeat(500);
    memory.add_page_completion(
        SegmentId::named("appendix"),
        &long,
        vec!["Terms".to_string(), "Fees".to_string()],
    );

    let highlight = memory.highlights().iter().next().unwrap();
    assert_eq!(highlight.summary.chars().count(), MAX_HIGHLIGHT_CHARS);
    assert_eq!(
        memory.section_map().get(&SegmentId::named("appendix")),
        Some(&vec!["Terms".to_string(), "Fees".to_string()])
    );
}

#[test]
fn failures_are_truncated_and_not_counted_as_completed() {
    let mut memory = ResearchMemory::default();
    memory.reset(4);
    memory.add_page_failure(SegmentId::Page(2), &"timeout ".repeat(40));

    assert_eq!(memory.failed_pages().len(), 1);
    assert!(memory.failed_pages()[0].error.chars().count() <= MAX_FAILURE_CHARS);
    assert_eq!(memory.completed_pages(), 0);
}

#[test]
fn duplicate_completion_counts_once_and_never_exceeds_total() {
    let mut memory = ResearchMemory::default();
    memory.reset(1);
    memory.add_page_completion(SegmentId::Page(0), "a", vec![]);
    memory.add_page_completion(SegmentId::Page(0), "a again", vec![]);
    memory.add_page_completion(SegmentId::Page(1), "extra", vec![]);

    let progress = memory.progress();
    assert_eq!(progress.completed_pages, 1);
    assert_eq!(progress.total_pages, 1);
    assert_eq!(progress.percentage, 100.0);
}

#[test]
fn progress_header_is_compact_and_deterministic() {
    let mut memory = ResearchMemory::default();
    memory.reset(10);
    for page in 1..=4u32 {
        memory.add_page_completion(SegmentId::Page(page), &format!("point {page}"), vec![]);
    }
    memory.add_page_failure(SegmentId::Page(5), "timeout");

    let header = memory.get_progress_header();
    assert_eq!(
        header,
        "Research progress: 40.0% (4/10 pages analyzed, 1 failed)\n\
         Recent findings:\n\
         - [page 2] point 2\n\
         - [page 3] point 3\n\
         - [page 4] point 4\n"
    );
    assert_eq!(header, memory.get_progress_header());
}

#[test]
fn empty_memory_is_immediately_usable() {
    let memory = ResearchMemory::default();
    assert_eq!(
        memory.get_progress_header(),
        "Research progress: 0.0% (0/0 pages analyzed, 0 failed)\nRecent findings: none yet\n"
    );
    assert_eq!(memory.get_cost_summary().total_cost, 0.0);
    assert!(memory.plan().is_none());
}

#[test]
fn reset_discards_previous_run() {
    let mut memory = ResearchMemory::new(2);
    memory.reset(5);
    memory.update_plan("plan");
    memory.add_page_completion(SegmentId::Page(0), "a", vec!["S".into()]);
    memory.add_page_failure(SegmentId::Page(1), "boom");
    memory.record_cost(TokenUsage::new(100, 10), 0.5);

    memory.reset(7);
    assert!(memory.plan().is_none());
    assert!(memory.highlights().is_empty());
    assert_eq!(memory.highlights().capacity(), 2);
    assert!(memory.failed_pages().is_empty());
    assert!(memory.section_map().is_empty());
    assert_eq!(memory.get_cost_summary().input_tokens, 0);
    assert_eq!(memory.total_pages(), 7);
}
