use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Addressable unit of a document: a numeric page index or an opaque segment id.
///
/// Pages sort before named segments; pages by index, names lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentId {
    Page(u32),
    Named(String),
}

impl SegmentId {
    pub fn page(index: u32) -> Self {
        SegmentId::Page(index)
    }

    pub fn named(id: impl Into<String>) -> Self {
        SegmentId::Named(id.into())
    }

    pub fn as_page(&self) -> Option<u32> {
        match self {
            SegmentId::Page(index) => Some(*index),
            SegmentId::Named(_) => None,
        }
    }
}

impl Ord for SegmentId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SegmentId::Page(a), SegmentId::Page(b)) => a.cmp(b),
            (SegmentId::Page(_), SegmentId::Named(_)) => Ordering::Less,
            (SegmentId::Named(_), SegmentId::Page(_)) => Ordering::Greater,
            (SegmentId::Named(a), SegmentId::Named(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SegmentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentId::Page(index) => write!(f, "page {index}"),
            SegmentId::Named(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for SegmentId {
    type Err = Infallible;

    /// All-digit input that fits a `u32` is a page, anything else a named segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse::<u32>() {
                return Ok(SegmentId::Page(index));
            }
        }
        Ok(SegmentId::Named(trimmed.to_string()))
    }
}

impl From<u32> for SegmentId {
    fn from(index: u32) -> Self {
        SegmentId::Page(index)
    }
}

impl From<&str> for SegmentId {
    fn from(id: &str) -> Self {
        SegmentId::Named(id.to_string())
    }
}
