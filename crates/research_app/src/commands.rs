use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use research_core::{JobStatus, ResearchJob};
use research_engine::{
    DirectoryContentProvider, EvidenceStore, FileEvidenceStore, HttpInferenceClient, JobOutcome,
    JobRequest, LogProgressSink, ResearchEngine, RunOverrides, StoreError,
};
use research_logging::{research_error, research_info};

use crate::config::AppConfig;

pub(crate) struct ResearchInvocation {
    pub document_id: String,
    pub query: String,
    pub index_id: String,
    pub job_id: Option<String>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_concurrent: Option<usize>,
    pub max_cost: Option<f64>,
    pub max_input_tokens: Option<u64>,
    pub output: Option<PathBuf>,
}

pub(crate) async fn research(config: &AppConfig, invocation: ResearchInvocation) -> Result<bool> {
    let backend = HttpInferenceClient::new(config.inference.clone())
        .context("inference backend configuration")?;
    let engine = ResearchEngine::with_backend(
        Arc::new(FileEvidenceStore::new(&config.evidence_path)),
        Arc::new(DirectoryContentProvider::new(&config.documents_path)),
        Arc::new(backend),
        config.research.clone(),
        Arc::new(LogProgressSink),
    )
    .context("research engine setup")?;

    let request = JobRequest {
        job_id: invocation.job_id,
        document_id: invocation.document_id,
        query: invocation.query,
        index_id: invocation.index_id,
        overrides: RunOverrides {
            batch_size: invocation.batch_size,
            max_concurrent: invocation.max_concurrent,
            workers: invocation.workers,
            max_total_cost: invocation.max_cost,
            max_input_tokens: invocation.max_input_tokens,
        },
    };

    match engine.submit(request).await {
        Ok(outcome) => {
            print!("{}", render_outcome(&outcome));
            if let Some(path) = &invocation.output {
                write_outcome(path, &outcome)?;
                research_info!("Outcome written to {:?}", path);
            }
            Ok(true)
        }
        Err(err) => {
            research_error!("research failed: {}", err);
            eprintln!("Research failed: {err}");
            Ok(false)
        }
    }
}

pub(crate) fn status(config: &AppConfig, job_id: &str, index_id: Option<&str>) -> Result<bool> {
    let store = FileEvidenceStore::new(&config.evidence_path);
    match store.get_job_in_scope(job_id, index_id) {
        Ok(job) => {
            print!("{}", render_status(&job));
            Ok(job.status != JobStatus::Failed)
        }
        Err(StoreError::NotFound(_)) => {
            eprintln!("Job not found: {job_id}");
            Ok(false)
        }
        Err(err) => Err(err).with_context(|| format!("reading job {job_id}")),
    }
}

pub(crate) fn list(config: &AppConfig) -> Result<bool> {
    let store = FileEvidenceStore::new(&config.evidence_path);
    let jobs = store
        .list_jobs()
        .with_context(|| format!("listing jobs under {:?}", config.evidence_path))?;
    if jobs.is_empty() {
        println!("No jobs found.");
    }
    for job in &jobs {
        println!("{}", render_list_line(job));
    }
    Ok(true)
}

fn write_outcome(path: &Path, outcome: &JobOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("serializing outcome")?;
    fs::write(path, json).with_context(|| format!("writing outcome to {path:?}"))
}

fn render_outcome(outcome: &JobOutcome) -> String {
    let job = &outcome.job;
    let mut out = String::new();
    let _ = writeln!(out, "Job: {}", job.job_id);
    let _ = writeln!(out, "Status: {}", job.status);
    if let Some(path) = &outcome.report_path {
        let _ = writeln!(out, "Report: {}", path.display());
    }
    let _ = writeln!(
        out,
        "Pages: {}/{} ({:.1}%), {} failed",
        job.progress.completed_pages,
        job.progress.total_pages,
        job.progress.percentage,
        outcome.failed_pages
    );
    if let Some(note) = &job.note {
        let _ = writeln!(out, "Note: {note}");
    }
    let _ = writeln!(
        out,
        "Tokens: {} in / {} out",
        job.cost.input_tokens, job.cost.output_tokens
    );
    let _ = writeln!(out, "Cost: ${:.4}", job.cost.total_cost);
    let _ = writeln!(out, "Evidence records: {}", outcome.evidence_count);
    out
}

fn render_status(job: &ResearchJob) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} ({:.1}%, {}/{} pages)",
        job.job_id,
        job.status,
        job.progress.percentage,
        job.progress.completed_pages,
        job.progress.total_pages
    );
    if let Some(error) = &job.error {
        let _ = writeln!(out, "Error: {error}");
    }
    if let Some(note) = &job.note {
        let _ = writeln!(out, "Note: {note}");
    }
    out
}

fn render_list_line(job: &ResearchJob) -> String {
    format!(
        "{}\t{}\t{:.1}%\t{}\t{}",
        job.job_id,
        job.status,
        job.progress.percentage,
        job.created_at.format("%Y-%m-%d %H:%M:%S"),
        job.document_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use research_core::{JobProgress, JobUpdate};

    fn job() -> ResearchJob {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        ResearchJob::new("job-1", "doc-9", "q", "idx", created)
    }

    #[test]
    fn list_line_shows_status_progress_and_creation_time() {
        let mut job = job();
        let now = job.created_at;
        job.apply(&JobUpdate::status(JobStatus::Running), now).unwrap();
        job.apply(&JobUpdate::default().with_progress(JobProgress::new(1, 4)), now)
            .unwrap();
        assert_eq!(
            render_list_line(&job),
            "job-1\trunning\t25.0%\t2024-03-01 12:30:00\tdoc-9"
        );
    }

    #[test]
    fn status_of_failed_job_includes_the_error() {
        let mut job = job();
        let now = job.created_at;
        job.apply(&JobUpdate::status(JobStatus::Running), now).unwrap();
        job.apply(
            &JobUpdate::status(JobStatus::Failed).with_error("content provider failure"),
            now,
        )
        .unwrap();
        let rendered = render_status(&job);
        assert!(rendered.starts_with("job-1: failed (0.0%, 0/0 pages)\n"));
        assert!(rendered.contains("Error: content provider failure"));
    }

    #[test]
    fn status_reads_from_the_evidence_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig {
            evidence_path: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        let store = FileEvidenceStore::new(dir.path());
        store.create_job(&job()).unwrap();

        assert!(status(&config, "job-1", None).unwrap());
        assert!(!status(&config, "job-1", Some("other")).unwrap());
        assert!(!status(&config, "missing", None).unwrap());
        assert!(list(&config).unwrap());
    }
}
