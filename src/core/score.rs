//! Lexical scoring and chunking for the retrieval helper.
//!
//! No vectors, no embeddings: chunks are ranked by weighted token overlap
//! with the query, lightly normalized by chunk length. Pragmatic and fast,
//! which matters because retrieval runs inline before every enriched agent
//! invocation.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_\-/]{2,}").expect("word regex"));

const CHUNK_MAX_CHARS: usize = 1_800;
const CHUNK_OVERLAP: usize = 150;

/// Lowercased word-ish tokens (identifiers, paths, plain words).
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Weighted token-overlap score between a query and a chunk.
///
/// Each query token contributes its query frequency times `1 + ln(1 + cf)`
/// where `cf` is the chunk frequency; the sum is normalized by
/// `sqrt(chunk_len + 50)` to keep long chunks from dominating.
pub fn score(query_tokens: &[String], chunk_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() || chunk_tokens.is_empty() {
        return 0.0;
    }

    let mut q: HashMap<&str, u32> = HashMap::new();
    for t in query_tokens {
        *q.entry(t.as_str()).or_insert(0) += 1;
    }
    let mut c: HashMap<&str, u32> = HashMap::new();
    for t in chunk_tokens {
        *c.entry(t.as_str()).or_insert(0) += 1;
    }

    let mut overlap = 0.0;
    for (t, w) in &q {
        if let Some(cf) = c.get(t) {
            overlap += f64::from(*w) * (1.0 + (1.0 + f64::from(*cf)).ln());
        }
    }

    overlap / ((chunk_tokens.len() as f64) + 50.0).sqrt()
}

/// Split text into overlapping chunks, preferring to break at line ends.
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with(text, CHUNK_MAX_CHARS, CHUNK_OVERLAP)
}

fn chunk_text_with(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let collapsed = collapse_blank_runs(normalized.trim());
    if collapsed.is_empty() {
        return Vec::new();
    }

    let bytes = collapsed.as_bytes();
    let n = bytes.len();
    let mut chunks = Vec::new();
    let mut i = 0usize;
    while i < n {
        let mut end = (i + max_chars).min(n);
        // Avoid splitting UTF-8 sequences and try not to cut mid-line.
        while end < n && !collapsed.is_char_boundary(end) {
            end -= 1;
        }
        let window = &collapsed[i..end];
        if end < n {
            if let Some(last_nl) = window.rfind('\n') {
                if last_nl > max_chars * 6 / 10 {
                    end = i + last_nl;
                }
            }
        }
        let chunk = collapsed[i..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end >= n {
            break;
        }
        // Advance with overlap, but never go backwards.
        let mut next = end.saturating_sub(overlap);
        if next <= i {
            next = end;
        }
        while next < n && !collapsed.is_char_boundary(next) {
            next += 1;
        }
        i = next;
    }
    chunks
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blanks = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blanks += 1;
            if blanks > 1 {
                continue;
            }
        } else {
            blanks = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_keeps_identifiers() {
        let tokens = tokenize("Run GateRunner::run in src/io/gates.rs");
        assert!(tokens.contains(&"gaterunner".to_string()));
        assert!(tokens.contains(&"src/io/gates".to_string()));
    }

    #[test]
    fn score_prefers_matching_chunk() {
        let query = tokenize("patch apply fallback");
        let relevant = tokenize("the patch apply fallback writes new files from added lines");
        let irrelevant = tokenize("completely unrelated walrus content about nothing");
        assert!(score(&query, &relevant) > score(&query, &irrelevant));
        assert_eq!(score(&query, &irrelevant), 0.0);
    }

    #[test]
    fn score_is_zero_for_empty_inputs() {
        assert_eq!(score(&[], &tokenize("anything")), 0.0);
        assert_eq!(score(&tokenize("anything"), &[]), 0.0);
    }

    #[test]
    fn chunk_text_splits_long_text_with_overlap() {
        let line = "some reasonably long line of documentation text\n";
        let text = line.repeat(200);
        let chunks = chunk_text_with(&text, 500, 100);
        assert!(chunks.len() > 2);
        // Overlap means consecutive chunks share a suffix/prefix.
        let tail: String = chunks[0].chars().rev().take(20).collect();
        let tail: String = tail.chars().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn chunk_text_empty_input_yields_no_chunks() {
        assert!(chunk_text("  \n\n  ").is_empty());
    }

    #[test]
    fn collapse_blank_runs_keeps_single_blank_lines() {
        let out = collapse_blank_runs("a\n\n\n\nb\n\nc");
        assert_eq!(out, "a\n\nb\n\nc");
    }
}
