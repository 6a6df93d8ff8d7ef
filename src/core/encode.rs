//! Minimal token-efficient table encoding for structured agent context.
//!
//! Uniform rows of primitive values become a compact `name[N]{fields}:` header
//! followed by CSV rows. This keeps retrieval packs cheap to feed to small
//! local models without dragging in a full serialization format.

use std::fmt;

/// A primitive cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{}", quote(s)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

/// Encoding failure: rows were not uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonUniformRows;

impl fmt::Display for NonUniformRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "non-uniform row keys; cannot tabularize")
    }
}

impl std::error::Error for NonUniformRows {}

/// Encode uniform rows as a compact table.
///
/// Every row must carry the same field names in the same order.
pub fn table(name: &str, fields: &[&str], rows: &[Vec<Value>]) -> Result<String, NonUniformRows> {
    if rows.is_empty() {
        return Ok(format!("{name}[0]{{}}:"));
    }
    if rows.iter().any(|r| r.len() != fields.len()) {
        return Err(NonUniformRows);
    }

    let mut out = format!("{name}[{}]{{{}}}:", rows.len(), fields.join(","));
    for row in rows {
        let line: Vec<String> = row.iter().map(Value::to_string).collect();
        out.push_str("\n  ");
        out.push_str(&line.join(","));
    }
    Ok(out)
}

/// Quote a string when it would break CSV row structure.
///
/// Strings containing comma, newline, tab, or surrounding whitespace are
/// wrapped in double quotes; embedded quotes are doubled.
fn quote(s: &str) -> String {
    if s.is_empty() {
        return "\"\"".to_string();
    }
    let mut needs = s.contains(',')
        || s.contains('\n')
        || s.contains('\r')
        || s.contains('\t')
        || s.trim() != s;
    let escaped = if s.contains('"') {
        needs = true;
        s.replace('"', "\"\"")
    } else {
        s.to_string()
    };
    if needs {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_uniform_rows() {
        let rows = vec![
            vec![Value::Int(1), "src/lib.rs".into(), Value::Float(0.5)],
            vec![Value::Int(2), "src/main.rs".into(), Value::Float(0.25)],
        ];
        let out = table("chunks", &["rank", "source", "score"], &rows).expect("table");
        assert_eq!(
            out,
            "chunks[2]{rank,source,score}:\n  1,src/lib.rs,0.5\n  2,src/main.rs,0.25"
        );
    }

    #[test]
    fn empty_rows_degenerate_header() {
        assert_eq!(table("chunks", &["a"], &[]).expect("table"), "chunks[0]{}:");
    }

    #[test]
    fn mismatched_row_width_is_rejected() {
        let rows = vec![vec![Value::Int(1)], vec![Value::Int(1), Value::Int(2)]];
        assert!(table("t", &["a"], &rows).is_err());
    }

    #[test]
    fn quotes_strings_with_commas_and_newlines() {
        let rows = vec![vec![Value::Str("a,b\nc".to_string())]];
        let out = table("t", &["v"], &rows).expect("table");
        assert_eq!(out, "t[1]{v}:\n  \"a,b\nc\"");
    }

    #[test]
    fn doubles_embedded_quotes() {
        let rows = vec![vec![Value::Str("say \"hi\"".to_string())]];
        let out = table("t", &["v"], &rows).expect("table");
        assert_eq!(out, "t[1]{v}:\n  \"say \"\"hi\"\"\"");
    }

    #[test]
    fn plain_strings_stay_bare() {
        assert_eq!(quote("plain_token"), "plain_token");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote(" padded"), "\" padded\"");
    }
}
