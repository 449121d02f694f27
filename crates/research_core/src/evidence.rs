use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, SegmentId};

/// Persisted analysis output for one segment of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub job_id: JobId,
    pub segment_id: SegmentId,
    pub content: String,
    /// Hex SHA-256 over the normalized content.
    pub hash: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPage {
    pub segment_id: SegmentId,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub segment_id: SegmentId,
    pub summary: String,
}
