//! Lexical retrieval over the target project's files.
//!
//! Walks the project tree, chunks readable text files, ranks chunks against
//! the query with [`crate::core::score`], and packs the winners into a compact
//! table for agent context. Chunks that look like they carry credentials are
//! dropped before scoring.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::config::RetrievalConfig;
use crate::core::encode::{self, Value};
use crate::core::score::{chunk_text, score, tokenize};

const ALLOWED_EXTENSIONS: [&str; 12] = [
    "md", "txt", "py", "rs", "ts", "js", "go", "java", "toml", "yaml", "yml", "json",
];
const SKIP_DIRS: [&str; 7] = [
    ".git",
    ".venv",
    "node_modules",
    "target",
    "dist",
    "__pycache__",
    ".redgreen",
];

/// Conservative patterns: any hit drops the whole chunk.
static SENSITIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{16,}\b",
        r"AKIA[0-9A-Z]{16}",
        r"-----BEGIN (?:RSA|EC|OPENSSH) PRIVATE KEY-----",
        r"(?i)github_pat_[A-Za-z0-9_]{20,}",
        r"(?i)api[_-]?key\s*[:=]",
        r"(?i)secret\s*[:=]",
        r"(?i)token\s*[:=]",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("sensitive pattern"))
    .collect()
});

/// One ranked chunk returned to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// Path relative to the project root.
    pub source: String,
    pub chunk_index: usize,
    pub score: f64,
    pub snippet: String,
}

/// Rank project chunks against `query` and return the top `k`.
#[instrument(skip_all, fields(query, k))]
pub fn retrieve(
    project: &Path,
    query: &str,
    k: usize,
    config: &RetrievalConfig,
) -> Result<Vec<RetrievalHit>> {
    let query_tokens = tokenize(query);
    let mut hits: Vec<RetrievalHit> = Vec::new();

    let mut file_count = 0usize;
    let mut chunk_count = 0usize;

    'files: for entry in WalkDir::new(project)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || !has_allowed_extension(entry.path()) {
            continue;
        }
        if config.max_files > 0 && file_count >= config.max_files {
            break;
        }
        file_count += 1;

        let Ok(text) = fs::read_to_string(entry.path()) else {
            continue; // binary or unreadable
        };
        let source = entry
            .path()
            .strip_prefix(project)
            .unwrap_or(entry.path())
            .display()
            .to_string();

        for (idx, chunk) in chunk_text(&text).into_iter().enumerate() {
            if looks_sensitive(&chunk) {
                continue;
            }
            chunk_count += 1;
            if config.max_chunks > 0 && chunk_count > config.max_chunks {
                break 'files;
            }
            let s = score(&query_tokens, &tokenize(&chunk));
            if s > 0.0 {
                hits.push(RetrievalHit {
                    source: source.clone(),
                    chunk_index: idx,
                    score: s,
                    snippet: chunk,
                });
            }
        }
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(k);
    debug!(files = file_count, chunks = chunk_count, hits = hits.len(), "retrieval done");
    Ok(hits)
}

/// Render hits as a compact context pack for the agent prompt.
pub fn render_pack(query: &str, hits: &[RetrievalHit]) -> String {
    let rows: Vec<Vec<Value>> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            vec![
                Value::Int((i + 1) as i64),
                hit.source.as_str().into(),
                Value::Int(hit.chunk_index as i64),
                Value::Float((hit.score * 1e6).round() / 1e6),
                hit.snippet.trim().into(),
            ]
        })
        .collect();

    let table = encode::table("chunks", &["rank", "source", "chunk", "score", "snippet"], &rows)
        .unwrap_or_else(|err| format!("(retrieval pack unavailable: {err})"));
    format!("query: {query}\n{table}")
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIP_DIRS.contains(&name))
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn looks_sensitive(text: &str) -> bool {
    SENSITIVE_PATTERNS.iter().any(|p| p.is_match(text))
}
