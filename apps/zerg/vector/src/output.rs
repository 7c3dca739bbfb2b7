use std::fmt::Write;

use domain_vector::{IngestSummary, SearchResult};

pub const PREVIEW_CHARS: usize = 200;

/// First `max_chars` characters of `text` with whitespace runs collapsed,
/// followed by `...` when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results.\n".to_string();
    }

    let mut out = String::new();
    for (rank, hit) in results.iter().enumerate() {
        let title = hit
            .metadata
            .get("title")
            .map(String::as_str)
            .unwrap_or(&hit.document_id);
        let _ = writeln!(out, "{}. [{:.4}] {}", rank + 1, hit.score, title);
        let _ = writeln!(out, "   {}", preview(&hit.text, PREVIEW_CHARS));
    }
    out
}

pub fn format_summary(summary: &IngestSummary) -> String {
    let mut out = format!(
        "Ingested {} document(s), {} chunk(s) written",
        summary.documents_processed, summary.chunks_written
    );
    if summary.cancelled {
        out.push_str(" (cancelled)");
    }
    out.push('\n');

    for failure in &summary.errors {
        let _ = writeln!(
            out,
            "  failed  {} at {}: {} ({} chunk(s) written)",
            failure.source_path, failure.stage, failure.message, failure.chunks_written
        );
    }
    if !summary.skipped.is_empty() {
        let _ = writeln!(out, "  skipped {}", summary.skipped.join(", "));
    }
    out
}
