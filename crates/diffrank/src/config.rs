//! Run configuration with sensible defaults.
//!
//! [`RunConfig`] captures where the inputs and output live, which models to
//! try, the diff budget, generation parameters, and the retry policy. The
//! binary fills it from CLI flags; library callers use the `with_*`
//! builders.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::fallback::ModelCandidates;
use crate::api::retry::RetryConfig;
use crate::error::RunError;
use crate::prompt::DEFAULT_MAX_DIFF_CHARS;
use crate::{DEFAULT_MODELS, GenerationConfig};

/// Default diff input, relative to the working directory.
pub const DEFAULT_DIFF_PATH: &str = "dff.txt";
/// Default test-case input, relative to the working directory.
pub const DEFAULT_TEST_CASES_PATH: &str = "test_case.txt";
/// Default output artifact, relative to the working directory.
pub const DEFAULT_OUTPUT_PATH: &str = "llm.txt";

/// Configuration for one scoring run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Diff input. Optional at run time. Default: `dff.txt`.
    pub diff_path: PathBuf,
    /// Test-case input. Required at run time. Default: `test_case.txt`.
    pub test_cases_path: PathBuf,
    /// Output artifact, overwritten on success. Default: `llm.txt`.
    pub output_path: PathBuf,
    /// Candidate model names in fallback order. Default: [`DEFAULT_MODELS`].
    pub models: Vec<String>,
    /// Diff budget in characters. Default: `500_000`.
    pub max_diff_chars: usize,
    /// Generation parameters. Default: JSON output at temperature `0.2`.
    pub generation: GenerationConfig,
    /// Attempt ceiling and cooldown. Default: 3 attempts, 30s cooldown.
    pub retry: RetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            diff_path: PathBuf::from(DEFAULT_DIFF_PATH),
            test_cases_path: PathBuf::from(DEFAULT_TEST_CASES_PATH),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            models: DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect(),
            max_diff_chars: DEFAULT_MAX_DIFF_CHARS,
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl RunConfig {
    /// Resolve all three file paths against `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            diff_path: dir.join(DEFAULT_DIFF_PATH),
            test_cases_path: dir.join(DEFAULT_TEST_CASES_PATH),
            output_path: dir.join(DEFAULT_OUTPUT_PATH),
            ..Default::default()
        }
    }

    pub fn with_diff_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.diff_path = path.into();
        self
    }

    pub fn with_test_cases_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.test_cases_path = path.into();
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Replace the candidate list. Order is fallback order.
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_diff_chars(mut self, max: usize) -> Self {
        self.max_diff_chars = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation.temperature = temperature;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry.cooldown = cooldown;
        self
    }

    /// The candidate list as a validated [`ModelCandidates`].
    pub fn candidates(&self) -> Result<ModelCandidates, RunError> {
        ModelCandidates::new(self.models.iter().map(String::as_str))
    }

    /// Reject settings that would make the run meaningless.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.retry.max_attempts == 0 {
            return Err(RunError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_diff_chars == 0 {
            return Err(RunError::InvalidConfig(
                "max_diff_chars must be at least 1".to_string(),
            ));
        }
        let t = self.generation.temperature;
        if !(0.0..=2.0).contains(&t) {
            return Err(RunError::InvalidConfig(format!(
                "temperature must be between 0.0 and 2.0, got {t}"
            )));
        }
        self.candidates().map(|_| ())
    }
}

/// Read the API key from `var`. Unset or blank is [`RunError::MissingCredential`].
pub fn api_key_from_env(var: &str) -> Result<String, RunError> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(RunError::MissingCredential {
            var: var.to_string(),
        }),
    }
}
