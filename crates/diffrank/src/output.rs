//! Response parsing, shape checks, and the output artifact.
//!
//! Models asked for JSON still sometimes wrap it in a markdown code fence,
//! so [`parse_assessments`] strips fences before parsing. Only a JSON object
//! is accepted. Per-entry shape problems are reported by
//! [`nonconforming_entries`] but do not block the write: the model is free
//! to use its own `change_nature` categories or add fields.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RunError;

/// Parsed model response: test-case identifier → assessment object.
pub type Assessments = Map<String, Value>;

/// Expected shape of one entry in the response.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct Assessment {
    /// How likely the test is to be affected by the change.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub relevance: f64,
    /// How intricate the affected behavior is.
    #[schemars(range(min = 0.0, max = 1.0))]
    pub complexity: f64,
    /// Short category such as `logic_change`, `refactor`, or `none`.
    pub change_nature: String,
}

/// An entry that does not match [`Assessment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonconforming {
    pub key: String,
    pub problems: Vec<String>,
}

/// Strip a surrounding markdown code fence, with or without a language tag.
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.split_once('\n') {
        Some((header, body)) if header.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model response into a JSON object.
pub fn parse_assessments(text: &str) -> Result<Assessments, RunError> {
    let clean = strip_markdown_fences(text);
    let value: Value = serde_json::from_str(clean).map_err(|e| {
        let preview: String = clean.chars().take(120).collect();
        debug!("Unparseable response preview: {preview}");
        RunError::ResponseParse {
            reason: e.to_string(),
        }
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(RunError::ResponseParse {
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Check each entry against the [`Assessment`] schema.
///
/// Returns the entries that fail, in key order. If the schema cannot be
/// compiled, validation is skipped and an empty list is returned.
pub fn nonconforming_entries(assessments: &Assessments) -> Vec<Nonconforming> {
    let schema = match serde_json::to_value(schemars::schema_for!(Assessment)) {
        Ok(s) => s,
        Err(e) => {
            warn!("Skipping response validation: {e}");
            return Vec::new();
        }
    };
    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(e) => {
            warn!("Skipping response validation: {e}");
            return Vec::new();
        }
    };

    assessments
        .iter()
        .filter_map(|(key, entry)| {
            let problems: Vec<String> = validator
                .iter_errors(entry)
                .map(|e| {
                    let path = e.instance_path().to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            if problems.is_empty() {
                None
            } else {
                Some(Nonconforming {
                    key: key.clone(),
                    problems,
                })
            }
        })
        .collect()
}

/// Serialize with four-space indentation and a trailing newline.
pub fn render_assessments(assessments: &Assessments) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::with_capacity(256);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    assessments.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}

/// Overwrite `path` with the indented assessments. Returns the number of
/// top-level entries written.
pub fn write_assessments(path: &Path, assessments: &Assessments) -> Result<usize, RunError> {
    if assessments.is_empty() {
        warn!("Model returned an empty JSON object; writing it anyway");
    }
    let bytes = render_assessments(assessments).map_err(|e| RunError::Io {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, &bytes).map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(assessments.len())
}
