//! Test-case relevance scoring for code diffs, backed by Google Gemini.
//!
//! `diffrank` reads a diff and a list of test cases, asks a Gemini model to
//! rate how relevant each test case is to the change, and writes the model's
//! JSON answer to disk. There is no local scoring: the interesting part is
//! the failure handling around the remote call.
//!
//! # Pipeline
//!
//! 1. [`input::load_text`] reads both input files (lossy UTF-8, trimmed).
//! 2. [`prompt::PromptBuilder`] defaults a missing diff, truncates an
//!    oversized one, and refuses to continue without test cases.
//! 3. [`api::retry::RetryOrchestrator`] drives the request. Each attempt runs
//!    [`api::fallback::generate_with_fallback`] over the candidate models;
//!    a rate-limited attempt sleeps for a fixed cooldown and tries again.
//! 4. [`output`] strips markdown fences, requires a JSON object, reports
//!    entries that do not match the expected shape, and overwrites the
//!    output file.
//!
//! [`run::execute`] wires the steps together. The binary adds credential
//! lookup, CLI flags and logging.
//!
//! # Example
//!
//! ```ignore
//! use diffrank::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), RunError> {
//!     let api_key = diffrank::config::api_key_from_env(diffrank::API_KEY_ENV)?;
//!     let client = GeminiClient::new(api_key).map_err(RunError::HttpClient)?;
//!     let summary = execute(&RunConfig::default(), &client, &LoggingHandler).await?;
//!     println!("{} entries from {}", summary.entries, summary.model);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`input`] | Lossy, trimmed file loading with an explicit "absent" result |
//! | [`prompt`] | Diff defaulting/truncation and the instruction template |
//! | [`api`] | [`ModelInvoker`] seam, model fallback, retry orchestration |
//! | [`output`] | Fence stripping, JSON-object parsing, schema checks, writing |
//! | [`events`] | [`RunEvent`](events::RunEvent) stream and handlers |
//! | [`config`] | [`RunConfig`] defaults, builders, validation |
//! | [`run`] | The end-to-end pipeline |
//! | [`telemetry`] | `tracing` subscriber setup for the binary |

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod output;
pub mod prelude;
pub mod prompt;
pub mod run;
pub mod telemetry;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub use api::invoker::ModelInvoker;
pub use config::RunConfig;
pub use error::{FallbackError, RunError, ServiceError};
pub use run::{RunSummary, execute};

// ── Constants ──────────────────────────────────────────────────────

/// Base URL of the Generative Language REST API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Candidate models, tried in order when one reports itself unavailable.
pub const DEFAULT_MODELS: &[&str] = &[
    "gemini-1.5-flash",
    "gemini-1.5-flash-latest",
    "gemini-1.5-pro",
];

/// MIME type requested for structured (JSON) output.
pub const JSON_MIME_TYPE: &str = "application/json";

/// Low sampling temperature for repeatable scores.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Transport timeout for a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

// ── Request types ──────────────────────────────────────────────────

/// Generation parameters sent with every request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Structured-output mode. `application/json` asks the service to
    /// constrain the response to JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::json(DEFAULT_TEMPERATURE)
    }
}

impl GenerationConfig {
    /// JSON output mode at the given temperature.
    pub fn json(temperature: f32) -> Self {
        Self {
            response_mime_type: Some(JSON_MIME_TYPE.to_string()),
            temperature,
        }
    }
}

/// `generateContent` request body.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Single-turn request carrying one user prompt.
    pub fn single_prompt(prompt: &str, config: &GenerationConfig) -> Self {
        Self {
            contents: vec![Content::user(prompt)],
            generation_config: Some(config.clone()),
        }
    }
}

/// A turn in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawGenerateResponse {
    #[serde(default)]
    candidates: Vec<RawCandidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Token accounting reported by the service.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub total_token_count: Option<u32>,
}

/// Clean return type from [`GeminiClient::generate_content`].
#[derive(Debug)]
pub struct Generation {
    /// Concatenated text of the first candidate's parts.
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageMetadata>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Gemini `generateContent` endpoint.
///
/// Owns the API key. Construct one per run and pass it by reference.
pub struct GeminiClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
}

impl GeminiClient {
    /// Create a client against the public endpoint with the default timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_options(
            api_key,
            GEMINI_BASE_URL,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create a client with a custom base URL and transport timeout.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("diffrank/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    /// URL of the `generateContent` method for `model`.
    ///
    /// Accepts both bare names (`gemini-1.5-flash`) and resource names
    /// (`models/gemini-1.5-flash`).
    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model.trim_start_matches("models/"),
        )
    }

    /// Send one request to one model.
    pub async fn generate_content(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<Generation, ServiceError> {
        let temperature = body
            .generation_config
            .as_ref()
            .map_or(0.0, |c| c.temperature);
        debug!(
            "LLM request: model={}, contents={}, temp={}",
            model,
            body.contents.len(),
            temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ServiceError::Other(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(classify_failure(model, status.as_u16(), &text));
        }

        parse_generation(model, &text)
    }
}

/// Map a non-2xx response onto a [`ServiceError`] variant.
///
/// Uses the HTTP status first and the API's `error.status` string second;
/// the service sometimes reports quota exhaustion with a non-429 code.
pub(crate) fn classify_failure(model: &str, status: u16, body: &str) -> ServiceError {
    let api_error = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let api_status = api_error.as_ref().and_then(|e| e.status.as_deref());
    let message = match &api_error {
        Some(e) if !e.message.is_empty() => e.message.clone(),
        _ => body.trim().to_string(),
    };

    match (status, api_status) {
        (404, _) | (_, Some("NOT_FOUND")) => ServiceError::NotFound {
            model: model.to_string(),
            message,
        },
        (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => ServiceError::RateLimited {
            model: model.to_string(),
            message,
        },
        _ => ServiceError::Other(format!("Gemini API HTTP {status}: {message}")),
    }
}

/// Extract the first candidate's text from a successful response body.
pub(crate) fn parse_generation(model: &str, text: &str) -> Result<Generation, ServiceError> {
    let parsed: RawGenerateResponse = serde_json::from_str(text)
        .map_err(|e| ServiceError::Other(format!("failed to parse response: {e}")))?;

    if let Some(ref usage) = parsed.usage_metadata {
        debug!(
            "Token usage: prompt={}, candidates={}, total={}",
            usage.prompt_token_count.unwrap_or(0),
            usage.candidates_token_count.unwrap_or(0),
            usage.total_token_count.unwrap_or(0),
        );
    }

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map_or_else(
                || "no candidates returned".to_string(),
                |r| format!("prompt blocked ({r})"),
            );
        return Err(ServiceError::Other(format!(
            "model `{model}` returned an empty response: {reason}"
        )));
    };

    let body: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if body.trim().is_empty() {
        return Err(ServiceError::Other(format!(
            "model `{model}` returned no text (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    debug!("LLM output: {} chars text", body.len());

    Ok(Generation {
        text: body,
        finish_reason: candidate.finish_reason,
        usage: parsed.usage_metadata,
    })
}
