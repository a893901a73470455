//! Error types for service calls, model fallback, and whole runs.
//!
//! [`ServiceError`] is the per-request classification produced by a
//! [`ModelInvoker`](crate::api::invoker::ModelInvoker). Callers branch on the
//! variant, never on the message text. [`RunError`] is what a run reports
//! to the binary, which turns any of them into a non-zero exit status.

use std::path::PathBuf;

/// Classified failure of a single request to a single model.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service does not recognize the model. The caller should move on
    /// to the next candidate instead of retrying this one.
    #[error("model `{model}` is not available: {message}")]
    NotFound { model: String, message: String },

    /// Rate limit or quota exhaustion. The same model may be retried after
    /// a cooldown.
    #[error("model `{model}` is rate limited: {message}")]
    RateLimited { model: String, message: String },

    /// Authentication, malformed request, network, or empty-response failures.
    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }
}

/// Failure of the ordered model-fallback loop.
#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    /// Every candidate reported [`ServiceError::NotFound`].
    #[error("no candidate model is available (tried: {})", .tried.join(", "))]
    Exhausted { tried: Vec<String> },

    /// A candidate failed with anything other than `NotFound`. The loop
    /// stops at that candidate.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Everything that can end a run with a non-zero exit status.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{var} environment variable is not set")]
    MissingCredential { var: String },

    #[error("required input is missing or empty: {input}")]
    MissingRequiredInput { input: String },

    #[error("no candidate model is available (tried: {})", .tried.join(", "))]
    ModelsExhausted { tried: Vec<String> },

    #[error("rate limit still in effect after {attempts} attempt(s): {source}")]
    QuotaExceeded {
        attempts: u32,
        #[source]
        source: ServiceError,
    },

    #[error("model response is not a valid JSON object: {reason}")]
    ResponseParse { reason: String },

    #[error("model request failed on attempt {attempt}: {source}")]
    Service {
        attempt: u32,
        #[source]
        source: ServiceError,
    },

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
