use std::fmt::Write;

use research_core::{normalize_content, SegmentId};
use sha2::{Digest, Sha256};

const MAX_STEM_LEN: usize = 80;

/// Storage key for a segment, unique per id and safe as a file stem on every platform.
///
/// Pages: `page-000042`. Named segments: `{sanitized}--{short_hash(id)}`.
pub fn segment_key(segment_id: &SegmentId) -> String {
    match segment_id {
        SegmentId::Page(index) => format!("page-{index:06}"),
        SegmentId::Named(id) => {
            let sanitized = sanitize_stem(id, "segment");
            let hash = short_hash(id);
            format!("{sanitized}--{hash}")
        }
    }
}

/// Job ids are caller supplied; they become directory and file names.
pub fn job_key(job_id: &str) -> String {
    let sanitized = sanitize_stem(job_id, "job");
    if sanitized == job_id {
        sanitized
    } else {
        format!("{sanitized}--{}", short_hash(job_id))
    }
}

/// Hex SHA-256 of the normalized content.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_content(content);
    let digest = Sha256::digest(normalized.as_bytes());
    to_hex(&digest)
}

/// Keeps letters, digits, `-` and inner dots; every other run of characters
/// becomes a single `_`. The result is capped at [`MAX_STEM_LEN`] chars and
/// never names a Windows device, even with an extension (`nul.txt`).
fn sanitize_stem(raw: &str, fallback: &str) -> String {
    let mut stem = String::with_capacity(raw.len().min(MAX_STEM_LEN));
    let mut kept = 0;
    let mut gap = false;
    for c in raw.chars() {
        if kept >= MAX_STEM_LEN {
            break;
        }
        if !(c.is_alphanumeric() || c == '-' || c == '.') {
            gap = true;
            continue;
        }
        if gap && !stem.is_empty() {
            stem.push('_');
            kept += 1;
        }
        gap = false;
        stem.push(c);
        kept += 1;
    }

    let mut stem = stem.trim_matches(['.', '_']).to_string();
    if stem.is_empty() {
        return fallback.to_string();
    }
    let device_len = stem.find('.').unwrap_or(stem.len());
    if is_device_name(&stem[..device_len]) {
        stem.insert(device_len, '_');
    }
    stem
}

fn is_device_name(name: &str) -> bool {
    const DEVICES: &[&str] = &["CON", "PRN", "AUX", "NUL"];
    if DEVICES.iter().any(|d| d.eq_ignore_ascii_case(name)) {
        return true;
    }
    let upper = name.to_ascii_uppercase();
    ["COM", "LPT"].iter().any(|prefix| {
        upper
            .strip_prefix(prefix)
            .is_some_and(|n| n.len() == 1 && matches!(n.as_bytes()[0], b'1'..=b'9'))
    })
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    to_hex(&digest[..4])
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
