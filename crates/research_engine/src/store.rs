use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use research_core::{
    EvidenceRecord, JobUpdate, ResearchJob, SegmentId, TransitionError,
};
use research_logging::{research_debug, research_error};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::keys::{content_hash, job_key, segment_key};
use crate::persist::{AtomicFileWriter, PersistError};
use crate::report::{ReportFormat, ResearchReport};

const JOBS_DIR: &str = "jobs";
const EVIDENCE_DIR: &str = "evidence";
const REPORTS_DIR: &str = "reports";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed record at {path}: {source}")]
    Serde {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

/// System of record for jobs, per-segment evidence and final reports.
///
/// Every write is durable before the call returns. Writes for different
/// evidence keys never touch each other; job updates go through a single
/// writer.
pub trait EvidenceStore: Send + Sync {
    fn create_job(&self, job: &ResearchJob) -> Result<(), StoreError>;

    fn get_job(&self, job_id: &str) -> Result<ResearchJob, StoreError>;

    /// Merges `update` into the stored job and returns the new record.
    fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<ResearchJob, StoreError>;

    /// All jobs, oldest first.
    fn list_jobs(&self) -> Result<Vec<ResearchJob>, StoreError>;

    /// Idempotent upsert of one segment's analysis.
    fn save_segment_evidence(
        &self,
        job_id: &str,
        segment_id: &SegmentId,
        content: &str,
    ) -> Result<EvidenceRecord, StoreError>;

    /// All evidence of a job in segment order (pages by index, then named segments).
    fn get_all_evidence(&self, job_id: &str) -> Result<Vec<EvidenceRecord>, StoreError>;

    fn save_report(
        &self,
        job_id: &str,
        report: &ResearchReport,
        format: ReportFormat,
    ) -> Result<PathBuf, StoreError>;

    fn load_report(&self, job_id: &str) -> Result<Option<ResearchReport>, StoreError>;

    /// Like [`EvidenceStore::get_job`], but a job outside the given access scope is not found.
    fn get_job_in_scope(
        &self,
        job_id: &str,
        index_id: Option<&str>,
    ) -> Result<ResearchJob, StoreError> {
        let job = self.get_job(job_id)?;
        match index_id {
            Some(index_id) if index_id != job.index_id => {
                Err(StoreError::NotFound(job_id.to_string()))
            }
            _ => Ok(job),
        }
    }
}

/// File-per-record store rooted at a directory:
/// `jobs/<job>.json`, `evidence/<job>/<segment>.json`, `reports/<job>/report.{json,md}`.
#[derive(Debug)]
pub struct FileEvidenceStore {
    root: PathBuf,
    job_writer: Mutex<()>,
}

impl FileEvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            job_writer: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.root.join(JOBS_DIR).join(format!("{}.json", job_key(job_id)))
    }

    fn evidence_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(EVIDENCE_DIR).join(job_key(job_id))
    }

    fn reports_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(REPORTS_DIR).join(job_key(job_id))
    }

    fn write_job(&self, job: &ResearchJob) -> Result<(), StoreError> {
        let path = self.job_path(&job.job_id);
        let json = to_json(job, &path)?;
        AtomicFileWriter::new(self.root.join(JOBS_DIR))
            .write(&format!("{}.json", job_key(&job.job_id)), &json)?;
        Ok(())
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable.
        self.job_writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EvidenceStore for FileEvidenceStore {
    fn create_job(&self, job: &ResearchJob) -> Result<(), StoreError> {
        if job.job_id.trim().is_empty() {
            return Err(StoreError::InvalidInput("job id must not be empty".into()));
        }
        let _guard = self.lock_jobs();
        if self.job_path(&job.job_id).exists() {
            return Err(StoreError::AlreadyExists(job.job_id.clone()));
        }
        self.write_job(job)?;
        research_debug!("job_id={} record created", job.job_id);
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<ResearchJob, StoreError> {
        read_json(&self.job_path(job_id))?.ok_or_else(|| StoreError::NotFound(job_id.to_string()))
    }

    fn update_job(&self, job_id: &str, update: &JobUpdate) -> Result<ResearchJob, StoreError> {
        let _guard = self.lock_jobs();
        let mut job = self.get_job(job_id)?;
        job.apply(update, Utc::now())?;
        self.write_job(&job)?;
        Ok(job)
    }

    fn list_jobs(&self) -> Result<Vec<ResearchJob>, StoreError> {
        let mut jobs: Vec<ResearchJob> = Vec::new();
        for path in json_files(&self.root.join(JOBS_DIR))? {
            if let Some(job) = read_json(&path)? {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(jobs)
    }

    fn save_segment_evidence(
        &self,
        job_id: &str,
        segment_id: &SegmentId,
        content: &str,
    ) -> Result<EvidenceRecord, StoreError> {
        if !self.job_path(job_id).exists() {
            return Err(StoreError::NotFound(job_id.to_string()));
        }
        let dir = self.evidence_dir(job_id);
        let key = segment_key(segment_id);
        let path = dir.join(format!("{key}.json"));
        let hash = content_hash(content);

        if let Some(existing) = read_json::<EvidenceRecord>(&path)? {
            if existing.hash == hash && existing.segment_id == *segment_id {
                research_debug!(
                    "job_id={} segment={} evidence unchanged (hash {})",
                    job_id,
                    segment_id,
                    &hash[..12]
                );
                return Ok(existing);
            }
        }

        let record = EvidenceRecord {
            job_id: job_id.to_string(),
            segment_id: segment_id.clone(),
            content: content.to_string(),
            hash,
            saved_at: Utc::now(),
        };
        let json = to_json(&record, &path)?;
        AtomicFileWriter::new(dir).write(&format!("{key}.json"), &json)?;
        Ok(record)
    }

    fn get_all_evidence(&self, job_id: &str) -> Result<Vec<EvidenceRecord>, StoreError> {
        let mut records: Vec<EvidenceRecord> = Vec::new();
        for path in json_files(&self.evidence_dir(job_id))? {
            if let Some(record) = read_json(&path)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.segment_id.cmp(&b.segment_id));
        Ok(records)
    }

    fn save_report(
        &self,
        job_id: &str,
        report: &ResearchReport,
        format: ReportFormat,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.reports_dir(job_id);
        let rendered = report.render(format).map_err(|source| StoreError::Serde {
            path: dir.join(format.filename()),
            source,
        })?;
        let path = AtomicFileWriter::new(dir).write(format.filename(), &rendered)?;
        Ok(path)
    }

    fn load_report(&self, job_id: &str) -> Result<Option<ResearchReport>, StoreError> {
        read_json(&self.reports_dir(job_id).join(ReportFormat::Json.filename()))
    }
}

fn to_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value).map_err(|source| StoreError::Serde {
        path: path.to_path_buf(),
        source,
    })
}

/// `Ok(None)` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text).map(Some).map_err(|source| {
        research_error!("Failed to parse record at {:?}: {}", path, source);
        StoreError::Serde {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Committed `.json` records in `dir`; in-flight temp files are skipped.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .filter(|p| {
            !p.file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|name| name.starts_with('.'))
        })
        .collect();
    paths.sort();
    Ok(paths)
}
