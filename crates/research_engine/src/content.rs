use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use research_core::SegmentId;
use research_logging::{research_debug, research_warn};
use thiserror::Error;
use tokio::task;

use crate::decode::{decode_text, DecodeError};

/// Upper bound, in bytes, for segment text placed in a single analysis prompt.
pub const MAX_SEGMENT_CONTENT: usize = 40_960;
/// How far back from the byte cap a truncation may move to end on a whole line.
const LINE_BACKTRACK: usize = 2_048;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("segment {segment_id} not found in document {document_id}")]
    SegmentNotFound {
        document_id: String,
        segment_id: SegmentId,
    },
    #[error("invalid document id: {0}")]
    InvalidDocument(String),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("content read task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// Source of analysis-ready segment text, produced by the ingestion pipeline.
#[async_trait::async_trait]
pub trait SegmentContentProvider: Send + Sync {
    /// Segment ids of a document in reading order.
    async fn list_segments(&self, document_id: &str) -> Result<Vec<SegmentId>, ContentError>;

    async fn fetch_segment(
        &self,
        document_id: &str,
        segment_id: &SegmentId,
    ) -> Result<String, ContentError>;
}

type SegmentIndex = Arc<BTreeMap<SegmentId, PathBuf>>;

/// Serves `<root>/<document_id>/*`: each regular file is one segment.
///
/// All-digit file stems are pages (`7.txt`, `0007.md`), any other stem is a
/// named segment. Hidden files are ignored. The directory is scanned once per
/// `list_segments` call and fetches resolve against that listing; a segment
/// missing from it triggers one rescan.
#[derive(Debug)]
pub struct DirectoryContentProvider {
    root: PathBuf,
    indexes: Mutex<HashMap<String, SegmentIndex>>,
}

impl DirectoryContentProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            indexes: Mutex::new(HashMap::new()),
        }
    }

    fn indexes(&self) -> MutexGuard<'_, HashMap<String, SegmentIndex>> {
        self.indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn rescan(&self, document_id: &str) -> Result<SegmentIndex, ContentError> {
        let root = self.root.clone();
        let id = document_id.to_string();
        let index = Arc::new(task::spawn_blocking(move || scan_document(&root, &id)).await??);
        self.indexes()
            .insert(document_id.to_string(), Arc::clone(&index));
        Ok(index)
    }

    async fn locate(
        &self,
        document_id: &str,
        segment_id: &SegmentId,
    ) -> Result<PathBuf, ContentError> {
        let cached = self.indexes().get(document_id).cloned();
        if let Some(path) = cached.as_ref().and_then(|index| index.get(segment_id)) {
            return Ok(path.clone());
        }
        research_debug!(
            "Segment {} of document {} not in listing; rescanning",
            segment_id,
            document_id
        );
        let index = self.rescan(document_id).await?;
        index
            .get(segment_id)
            .cloned()
            .ok_or_else(|| ContentError::SegmentNotFound {
                document_id: document_id.to_string(),
                segment_id: segment_id.clone(),
            })
    }
}

#[async_trait::async_trait]
impl SegmentContentProvider for DirectoryContentProvider {
    async fn list_segments(&self, document_id: &str) -> Result<Vec<SegmentId>, ContentError> {
        let index = self.rescan(document_id).await?;
        Ok(index.keys().cloned().collect())
    }

    async fn fetch_segment(
        &self,
        document_id: &str,
        segment_id: &SegmentId,
    ) -> Result<String, ContentError> {
        let path = self.locate(document_id, segment_id).await?;
        let text = task::spawn_blocking(move || -> Result<String, ContentError> {
            let bytes = fs::read(&path).map_err(|source| ContentError::Io { path, source })?;
            Ok(decode_text(&bytes)?.text)
        })
        .await??;
        Ok(prepare_segment_content(&text))
    }
}

fn document_dir(root: &Path, document_id: &str) -> Result<PathBuf, ContentError> {
    let trimmed = document_id.trim();
    let invalid = trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
        || trimmed.contains('\0');
    if invalid {
        return Err(ContentError::InvalidDocument(document_id.to_string()));
    }
    let dir = root.join(trimmed);
    if !dir.is_dir() {
        return Err(ContentError::DocumentNotFound(document_id.to_string()));
    }
    Ok(dir)
}

fn scan_document(
    root: &Path,
    document_id: &str,
) -> Result<BTreeMap<SegmentId, PathBuf>, ContentError> {
    let dir = document_dir(root, document_id)?;
    let entries = fs::read_dir(&dir).map_err(|source| ContentError::Io {
        path: dir.clone(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .filter(|p| !is_hidden(p))
        .collect();
    paths.sort();

    let mut segments = BTreeMap::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            research_warn!("Skipping segment file with non UTF-8 name: {:?}", path);
            continue;
        };
        let Ok(segment_id) = stem.parse::<SegmentId>();
        if let Some(existing) = segments.get(&segment_id) {
            research_warn!(
                "Segment {} of document {} has several files; keeping {:?}, ignoring {:?}",
                segment_id,
                document_id,
                existing,
                path
            );
            continue;
        }
        segments.insert(segment_id, path);
    }
    Ok(segments)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

/// Segment text as it goes into a prompt.
///
/// The ingestion header block is dropped, line endings become `\n`, and text
/// beyond [`MAX_SEGMENT_CONTENT`] bytes is cut, on a line break when one is
/// close enough, followed by a note of how much was left out.
pub fn prepare_segment_content(text: &str) -> String {
    let body = strip_ingestion_header(text).replace("\r\n", "\n");
    if body.len() <= MAX_SEGMENT_CONTENT {
        return body;
    }
    let cut = cut_point(&body, MAX_SEGMENT_CONTENT);
    let omitted = body.len() - cut;
    format!(
        "{}\n[segment truncated: {omitted} bytes omitted]",
        body[..cut].trim_end()
    )
}

fn cut_point(body: &str, limit: usize) -> usize {
    let mut end = limit.min(body.len());
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    match body[..end].rfind('\n') {
        Some(newline) if end - newline <= LINE_BACKTRACK => newline + 1,
        _ => end,
    }
}

/// Drops a leading `---` delimited header; an unterminated one is kept as body text.
fn strip_ingestion_header(text: &str) -> &str {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return text;
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            return rest[offset + line.len()..].trim_start_matches(['\r', '\n']);
        }
        offset += line.len();
    }
    text
}
