/// Keeps at most `max_chars` characters, collapsing newlines so the result
/// stays on one line.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let flattened: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    flattened.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Canonical form used for content hashing: LF line endings, no trailing
/// whitespace per line, no leading/trailing blank space.
pub fn normalize_content(content: &str) -> String {
    let unified = content.replace("\r\n", "\n").replace('\r', "\n");
    unified
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Markdown-style section titles (`# Title`, `## Title`, ...) in order of appearance.
pub fn detect_sections(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .filter_map(|line| {
            let title = line.trim_start_matches('#');
            // `#hashtag` is not a heading.
            if !title.starts_with(' ') {
                return None;
            }
            let title = title.trim().trim_end_matches('#').trim();
            (!title.is_empty()).then(|| title.to_string())
        })
        .collect()
}
