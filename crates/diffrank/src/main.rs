//! Score how relevant each test case is to a code diff using Gemini.
//!
//! Reads the API key from the `GEMINI_API_KEY` environment variable, the
//! diff from `dff.txt` and the test cases from `test_case.txt`, and writes
//! the model's JSON assessment to `llm.txt`.
//!
//! # Examples
//!
//! ```sh
//! # Defaults: ./dff.txt + ./test_case.txt -> ./llm.txt
//! git diff main... > dff.txt
//! diffrank
//!
//! # Custom paths and model order
//! diffrank --diff-file changes.diff --test-cases-file cases.txt \
//!   --output scores.json --model gemini-2.0-flash --model gemini-1.5-flash
//!
//! # Smaller diff budget, faster retries, JSON logs
//! diffrank --max-diff-chars 100000 --cooldown-secs 10 --log-json
//! ```

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use diffrank::config::{
    DEFAULT_DIFF_PATH, DEFAULT_OUTPUT_PATH, DEFAULT_TEST_CASES_PATH, RunConfig, api_key_from_env,
};
use diffrank::events::LoggingHandler;
use diffrank::prompt::DEFAULT_MAX_DIFF_CHARS;
use diffrank::{
    API_KEY_ENV, DEFAULT_MODELS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
    GEMINI_BASE_URL, GeminiClient, RunError, RunSummary,
};
use tracing::Level;

/// Score how relevant each test case is to a code diff using Gemini.
///
/// Reads the API key from the GEMINI_API_KEY environment variable.
#[derive(Parser)]
#[command(name = "diffrank", version)]
struct Cli {
    // ── Files ──────────────────────────────────────────────────
    /// Diff to analyze (optional; a missing file means "no changes")
    #[arg(long, default_value = DEFAULT_DIFF_PATH)]
    diff_file: PathBuf,

    /// Test cases to score (required)
    #[arg(long, default_value = DEFAULT_TEST_CASES_PATH)]
    test_cases_file: PathBuf,

    /// Where to write the JSON assessment (overwritten)
    #[arg(long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    // ── Model ──────────────────────────────────────────────────
    /// Candidate model, repeatable; tried in order when one is not found
    #[arg(long = "model")]
    models: Vec<String>,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Maximum diff length in characters before truncation
    #[arg(long, default_value_t = DEFAULT_MAX_DIFF_CHARS)]
    max_diff_chars: usize,

    // ── Retry ──────────────────────────────────────────────────
    /// Attempts before giving up on rate limits (including the first)
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Seconds to wait after a rate-limited attempt
    #[arg(long, default_value_t = 30)]
    cooldown_secs: u64,

    // ── Transport ──────────────────────────────────────────────
    /// API base URL
    #[arg(long, default_value = GEMINI_BASE_URL)]
    base_url: String,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    // ── Logging ────────────────────────────────────────────────
    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let models: Vec<String> = if self.models.is_empty() {
            DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect()
        } else {
            self.models.clone()
        };
        RunConfig::default()
            .with_diff_path(&self.diff_file)
            .with_test_cases_path(&self.test_cases_file)
            .with_output_path(&self.output)
            .with_models(models)
            .with_temperature(self.temperature)
            .with_max_diff_chars(self.max_diff_chars)
            .with_max_attempts(self.max_attempts)
            .with_cooldown(Duration::from_secs(self.cooldown_secs))
    }
}

async fn run(cli: &Cli) -> Result<RunSummary, RunError> {
    // The credential is checked before anything else is read.
    let api_key = api_key_from_env(API_KEY_ENV)?;

    let config = cli.run_config();
    config.validate()?;

    let client = GeminiClient::with_options(
        api_key,
        cli.base_url.clone(),
        Duration::from_secs(cli.timeout_secs),
    )
    .map_err(RunError::HttpClient)?;

    diffrank::execute(&config, &client, &LoggingHandler).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    diffrank::telemetry::init_tracing(cli.log_json, level);

    match run(&cli).await {
        Ok(summary) => {
            if summary.nonconforming > 0 {
                eprintln!(
                    "  Warning: {} entr{} did not match the expected shape",
                    summary.nonconforming,
                    if summary.nonconforming == 1 { "y" } else { "ies" }
                );
            }
            println!(
                "Successfully generated {} with {} entries (model {}, attempt {}).",
                summary.output_path.display(),
                summary.entries,
                summary.model,
                summary.attempts,
            );
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
