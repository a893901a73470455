//! The end-to-end scoring pipeline.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::api::retry::RetryOrchestrator;
use crate::config::RunConfig;
use crate::error::RunError;
use crate::events::EventHandler;
use crate::prompt::PromptBuilder;
use crate::{ModelInvoker, input, output};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Top-level entries written to the output file.
    pub entries: usize,
    /// Model that answered.
    pub model: String,
    /// Attempt (1-based) that succeeded.
    pub attempts: u32,
    /// Entries that did not match the expected assessment shape.
    pub nonconforming: usize,
    pub output_path: PathBuf,
    pub diff_truncated: bool,
}

/// Load inputs, build the prompt, query the model, and write the result.
///
/// Configuration and the required test-case input are checked before the
/// invoker is touched. The output file is written only on success.
pub async fn execute(
    config: &RunConfig,
    invoker: &dyn ModelInvoker,
    event_handler: &dyn EventHandler,
) -> Result<RunSummary, RunError> {
    config.validate()?;
    let candidates = config.candidates()?;

    let diff = input::load_text(&config.diff_path)?;
    let test_cases = input::load_text(&config.test_cases_path)?;

    let prompt = PromptBuilder::new(config.max_diff_chars)
        .with_test_cases_source(config.test_cases_path.display().to_string())
        .build(diff.as_deref(), test_cases.as_deref())?;
    info!(
        "Prompt ready: {} chars (diff {} chars{})",
        prompt.char_count(),
        prompt.original_diff_chars(),
        if prompt.diff_truncated() { ", truncated" } else { "" }
    );

    let assessed = RetryOrchestrator::new(invoker, &candidates, &config.generation, &config.retry)
        .with_event_handler(event_handler)
        .run(&prompt)
        .await?;

    let flagged = output::nonconforming_entries(&assessed.assessments);
    for entry in &flagged {
        warn!(
            "Entry {:?} does not match the expected shape: {}",
            entry.key,
            entry.problems.join("; ")
        );
    }

    let entries = output::write_assessments(&config.output_path, &assessed.assessments)?;

    Ok(RunSummary {
        entries,
        model: assessed.model,
        attempts: assessed.attempts,
        nonconforming: flagged.len(),
        output_path: config.output_path.clone(),
        diff_truncated: prompt.diff_truncated(),
    })
}
