use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use research_core::{FailedPage, JobCost, JobId, JobProgress, JobStatus, SegmentId, StopReason};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn filename(self) -> &'static str {
        match self {
            ReportFormat::Json => "report.json",
            ReportFormat::Markdown => "report.md",
        }
    }
}

/// Final research report for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub job_id: JobId,
    pub document_id: String,
    pub query: String,
    pub index_id: String,
    pub status: JobStatus,
    pub plan: Option<String>,
    pub summary: String,
    pub stop_reason: Option<StopReason>,
    pub progress: JobProgress,
    pub cost: JobCost,
    pub failed_pages: Vec<FailedPage>,
    /// Serialized as a list; JSON object keys cannot hold numeric page ids.
    #[serde(with = "section_list")]
    pub sections: BTreeMap<SegmentId, Vec<String>>,
    pub evidence_count: usize,
    pub generated_at: DateTime<Utc>,
}

impl ResearchReport {
    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Json => serde_json::to_string_pretty(self),
            ReportFormat::Markdown => Ok(render_markdown(self)),
        }
    }
}

pub fn render_markdown(report: &ResearchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Research report: {}\n", report.job_id);
    let _ = writeln!(out, "- Document: {}", report.document_id);
    let _ = writeln!(out, "- Query: {}", report.query);
    let _ = writeln!(out, "- Status: {}", report.status);
    let _ = writeln!(
        out,
        "- Coverage: {}/{} pages ({:.1}%)",
        report.progress.completed_pages, report.progress.total_pages, report.progress.percentage
    );
    let _ = writeln!(
        out,
        "- Tokens: {} in / {} out",
        report.cost.input_tokens, report.cost.output_tokens
    );
    let _ = writeln!(out, "- Cost: ${:.4}", report.cost.total_cost);
    if let Some(reason) = &report.stop_reason {
        let _ = writeln!(out, "- Stopped: {reason}");
    }
    let _ = writeln!(out, "- Generated: {}", report.generated_at.to_rfc3339());

    out.push_str("\n## Summary\n\n");
    out.push_str(report.summary.trim_end());
    out.push('\n');

    if let Some(plan) = &report.plan {
        out.push_str("\n## Research plan\n\n");
        out.push_str(plan.trim_end());
        out.push('\n');
    }

    if !report.failed_pages.is_empty() {
        out.push_str("\n## Failed segments\n\n");
        for failed in &report.failed_pages {
            let _ = writeln!(out, "- {}: {}", failed.segment_id, failed.error);
        }
    }

    if !report.sections.is_empty() {
        out.push_str("\n## Sections\n\n");
        for (segment_id, titles) in &report.sections {
            let _ = writeln!(out, "- {}: {}", segment_id, titles.join("; "));
        }
    }
    out
}

mod section_list {
    use std::collections::BTreeMap;

    use research_core::SegmentId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        segment_id: SegmentId,
        titles: Vec<String>,
    }

    pub(super) fn serialize<S: Serializer>(
        map: &BTreeMap<SegmentId, Vec<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let entries: Vec<Entry> = map
            .iter()
            .map(|(segment_id, titles)| Entry {
                segment_id: segment_id.clone(),
                titles: titles.clone(),
            })
            .collect();
        entries.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<SegmentId, Vec<String>>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.segment_id, entry.titles))
            .collect())
    }
}
