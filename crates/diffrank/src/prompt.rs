//! Prompt assembly for test-case relevance scoring.
//!
//! [`PromptBuilder`] applies the input policy before rendering the
//! template: a missing or empty diff becomes [`NO_CHANGES_FALLBACK`], an
//! oversized diff is cut to the character budget and marked with
//! [`TRUNCATION_MARKER`], and missing test cases stop the run.

use std::fmt;

use tracing::warn;

use crate::error::RunError;

/// Substituted for a missing or empty diff.
pub const NO_CHANGES_FALLBACK: &str = "No changes detected.";

/// Appended to a diff that was cut to the character budget.
pub const TRUNCATION_MARKER: &str = "\n...[TRUNCATED]...";

/// Default diff budget in characters.
pub const DEFAULT_MAX_DIFF_CHARS: usize = 500_000;

/// The rendered prompt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    diff_chars: usize,
    diff_truncated: bool,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the diff was cut to fit the budget.
    pub fn diff_truncated(&self) -> bool {
        self.diff_truncated
    }

    /// Length of the diff before truncation, in characters.
    pub fn original_diff_chars(&self) -> usize {
        self.diff_chars
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds a [`Prompt`] from diff and test-case text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_diff_chars: usize,
    test_cases_source: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIFF_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(max_diff_chars: usize) -> Self {
        Self {
            max_diff_chars,
            test_cases_source: "test cases".to_string(),
        }
    }

    /// Name the test-case input in error messages (usually its path).
    pub fn with_test_cases_source(mut self, source: impl Into<String>) -> Self {
        self.test_cases_source = source.into();
        self
    }

    /// Apply the input policy and render the prompt.
    pub fn build(&self, diff: Option<&str>, test_cases: Option<&str>) -> Result<Prompt, RunError> {
        let test_cases = match test_cases {
            Some(t) if !t.trim().is_empty() => t,
            _ => {
                return Err(RunError::MissingRequiredInput {
                    input: self.test_cases_source.clone(),
                });
            }
        };

        let diff = match diff {
            Some(d) if !d.trim().is_empty() => d,
            _ => {
                warn!("Diff is empty or missing. Assuming no code changes.");
                NO_CHANGES_FALLBACK
            }
        };

        let diff_chars = diff.chars().count();
        let (diff_text, diff_truncated) = match truncate_chars(diff, self.max_diff_chars) {
            Some(cut) => {
                warn!(
                    "Diff is very large ({diff_chars} chars). Truncating to {} chars.",
                    self.max_diff_chars
                );
                (format!("{cut}{TRUNCATION_MARKER}"), true)
            }
            None => (diff.to_string(), false),
        };

        Ok(Prompt {
            text: render(&diff_text, test_cases),
            diff_chars,
            diff_truncated,
        })
    }
}

/// First `max_chars` characters of `text`, or `None` if it already fits.
pub fn truncate_chars(text: &str, max_chars: usize) -> Option<&str> {
    text.char_indices()
        .nth(max_chars)
        .map(|(byte_idx, _)| text.split_at(byte_idx).0)
}

fn render(diff: &str, test_cases: &str) -> String {
    format!(
        "\
You are a software engineering assistant specialized in test case prioritization.

Task: analyze the code changes (git diff) below and assess how relevant each of the listed test cases is to them.

CONTEXT:
--- BEGIN GIT DIFF ---
{diff}
--- END GIT DIFF ---

--- BEGIN TEST CASES ---
{test_cases}
--- END TEST CASES ---

INSTRUCTIONS:
1. Analyze the semantic intent of the code changes.
2. For EVERY test case listed above, produce an object with:
   - \"relevance\": float from 0.0 to 1.0.
   - \"complexity\": float from 0.0 to 1.0.
   - \"change_nature\": short string describing the change (e.g. \"logic_change\", \"refactor\", \"none\").
3. Respond with a single JSON object whose keys are the test case identifiers and whose values are those objects. Output only the JSON object."
    )
}
