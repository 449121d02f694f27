use std::fs;

use research_core::SegmentId;
use research_engine::{
    prepare_segment_content, ContentError, DirectoryContentProvider, SegmentContentProvider,
    MAX_SEGMENT_CONTENT,
};
use tempfile::TempDir;

fn document(files: &[(&str, &[u8])]) -> (TempDir, DirectoryContentProvider) {
    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("report-2024");
    fs::create_dir_all(&doc).unwrap();
    for (name, bytes) in files {
        fs::write(doc.join(name), bytes).unwrap();
    }
    let provider = DirectoryContentProvider::new(dir.path());
    (dir, provider)
}

#[tokio::test]
async fn segments_are_listed_pages_first_in_index_order() {
    let (_dir, provider) = document(&[
        ("10.md", b"ten"),
        ("2.md", b"two"),
        ("appendix.md", b"extra"),
        (".hidden", b"skip me"),
        ("1.txt", b"one"),
    ]);
    let segments = provider.list_segments("report-2024").await.unwrap();
    assert_eq!(
        segments,
        vec![
            SegmentId::page(1),
            SegmentId::page(2),
            SegmentId::page(10),
            SegmentId::named("appendix"),
        ]
    );
}

#[tokio::test]
async fn duplicate_stems_keep_the_first_file() {
    let (_dir, provider) = document(&[("3.md", b"markdown"), ("3.txt", b"text")]);
    let segments = provider.list_segments("report-2024").await.unwrap();
    assert_eq!(segments, vec![SegmentId::page(3)]);
    let content = provider
        .fetch_segment("report-2024", &SegmentId::page(3))
        .await
        .unwrap();
    assert_eq!(content, "markdown");
}

#[tokio::test]
async fn fetched_content_is_decoded_and_frontmatter_stripped() {
    let mut utf16 = vec![0xFF, 0xFE];
    for unit in "Seite zwei".encode_utf16() {
        utf16.extend_from_slice(&unit.to_le_bytes());
    }
    let (_dir, provider) = document(&[
        ("1.md", b"---\nsource: scan\n---\n\n# Overview\nBody text\n"),
        ("2.txt", &utf16),
    ]);

    let first = provider
        .fetch_segment("report-2024", &SegmentId::page(1))
        .await
        .unwrap();
    assert_eq!(first, "# Overview\nBody text\n");

    let second = provider
        .fetch_segment("report-2024", &SegmentId::page(2))
        .await
        .unwrap();
    assert_eq!(second, "Seite zwei");
}

#[tokio::test]
async fn unknown_documents_and_segments_are_reported() {
    let (_dir, provider) = document(&[("1.md", b"one")]);

    let err = provider.list_segments("missing").await.unwrap_err();
    assert!(matches!(err, ContentError::DocumentNotFound(_)));

    let err = provider.list_segments("../etc").await.unwrap_err();
    assert!(matches!(err, ContentError::InvalidDocument(_)));

    let err = provider
        .fetch_segment("report-2024", &SegmentId::page(9))
        .await
        .unwrap_err();
    assert!(matches!(err, ContentError::SegmentNotFound { .. }));
}

#[tokio::test]
async fn fetches_resolve_against_the_listing() {
    let (dir, provider) = document(&[("1.md", b"listed copy"), ("2.md", b"two")]);
    let listed = provider.list_segments("report-2024").await.unwrap();
    assert_eq!(listed.len(), 2);

    // A file that would win a fresh scan for page 1 is not picked up mid-run.
    fs::write(dir.path().join("report-2024/1.a"), b"late copy").unwrap();
    let content = provider
        .fetch_segment("report-2024", &SegmentId::page(1))
        .await
        .unwrap();
    assert_eq!(content, "listed copy");

    // The next listing sees the directory as it is now.
    provider.list_segments("report-2024").await.unwrap();
    let content = provider
        .fetch_segment("report-2024", &SegmentId::page(1))
        .await
        .unwrap();
    assert_eq!(content, "late copy");
}

#[tokio::test]
async fn segment_added_after_listing_is_found_by_one_rescan() {
    let (dir, provider) = document(&[("1.md", b"one")]);
    provider.list_segments("report-2024").await.unwrap();
    fs::write(dir.path().join("report-2024/glossary.md"), b"terms").unwrap();

    let content = provider
        .fetch_segment("report-2024", &SegmentId::named("glossary"))
        .await
        .unwrap();
    assert_eq!(content, "terms");
}

#[tokio::test]
async fn scanned_page_with_crlf_header_is_cleaned() {
    let (_dir, provider) = document(&[(
        "4.txt",
        b"---\r\nsource: scan\r\npage: 4\r\n---\r\n\r\nQuarterly fees rose.\r\nSee table 2.\r\n",
    )]);
    let content = provider
        .fetch_segment("report-2024", &SegmentId::page(4))
        .await
        .unwrap();
    assert_eq!(content, "Quarterly fees rose.\nSee table 2.\n");
}

#[test]
fn unterminated_header_is_kept_as_page_text() {
    let page = "---\nnot a header after all\nFees are listed below.\n";
    assert_eq!(prepare_segment_content(page), page);
}

#[test]
fn long_ledger_page_is_cut_on_a_whole_line() {
    let page: String = (1..=2_000)
        .map(|n| format!("Line {n:05}: fee schedule entry\n"))
        .collect();
    assert!(page.len() > MAX_SEGMENT_CONTENT);

    let prepared = prepare_segment_content(&page);
    let (kept, note) = prepared
        .split_once("\n[segment truncated: ")
        .expect("truncation note");
    assert!(kept.len() <= MAX_SEGMENT_CONTENT);
    assert!(kept.ends_with("fee schedule entry"));
    assert_eq!(note, format!("{} bytes omitted]", page.len() - kept.len() - 1));
}

#[test]
fn page_without_line_breaks_is_cut_on_a_char_boundary() {
    let page = "Größe ".repeat(10_000);
    let prepared = prepare_segment_content(&page);
    let (kept, _) = prepared
        .split_once("\n[segment truncated: ")
        .expect("truncation note");
    assert!(kept.len() <= MAX_SEGMENT_CONTENT);
    assert!(kept.starts_with("Größe Größe"));
}
