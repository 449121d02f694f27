//! Prompt builders. Each one produces a single self-contained prompt; the
//! progress header is the only memory carried between calls.

use std::fmt::Write;

use research_core::{truncate_chars, SegmentId};

/// Characters of each evidence record quoted in the final summary context.
pub const SUMMARY_EVIDENCE_CHARS: usize = 200;
/// Characters of each segment analysis quoted in a batch assessment.
pub const BATCH_ENTRY_CHARS: usize = 300;

pub fn plan_prompt(query: &str, total_pages: usize) -> String {
    format!(
        "You are planning a research pass over a document with {total_pages} segment(s).\n\
         Research question: {query}\n\n\
         Write a short plan: what to look for in each segment, which findings matter most, \
         and what would count as a complete answer. Keep it under 200 words."
    )
}

pub fn segment_prompt(
    query: &str,
    plan: Option<&str>,
    header: &str,
    segment_id: &SegmentId,
    content: &str,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Research question: {query}");
    if let Some(plan) = plan {
        let _ = writeln!(prompt, "\nResearch plan:\n{}", plan.trim_end());
    }
    let _ = writeln!(prompt, "\n{}", header.trim_end());
    let _ = writeln!(prompt, "\nContent of {segment_id}:\n{}", content.trim_end());
    prompt.push_str(
        "\nAnalyze this segment with respect to the research question. Start with a one \
         sentence summary, then list the relevant findings. Quote section headings as \
         `# Heading` lines when the segment has them.",
    );
    prompt
}

pub fn batch_assessment_prompt(
    query: &str,
    header: &str,
    batch: &[(SegmentId, String)],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Research question: {query}");
    let _ = writeln!(prompt, "\n{}", header.trim_end());
    let _ = writeln!(prompt, "\nLatest batch ({} segment(s)):", batch.len());
    for (segment_id, analysis) in batch {
        let _ = writeln!(
            prompt,
            "- [{segment_id}] {}",
            truncate_chars(analysis, BATCH_ENTRY_CHARS)
        );
    }
    prompt.push_str(
        "\nAssess this batch: what was learned, what is still missing, and whether the \
         plan should change.",
    );
    prompt
}

pub fn summary_prompt(query: &str, header: &str, evidence: &[(SegmentId, String)]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Research question: {query}");
    let _ = writeln!(prompt, "\n{}", header.trim_end());
    let _ = writeln!(prompt, "\nEvidence:");
    for (segment_id, content) in evidence {
        let _ = writeln!(
            prompt,
            "- [{segment_id}] {}",
            truncate_chars(content, SUMMARY_EVIDENCE_CHARS)
        );
    }
    prompt.push_str(
        "\nWrite the final answer to the research question using only the evidence above. \
         Mention which segments support each point and note any gaps in coverage.",
    );
    prompt
}
