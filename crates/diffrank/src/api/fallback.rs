//! Ordered model fallback.
//!
//! Model names come and go on the service side. When a candidate reports
//! [`ServiceError::NotFound`] the next one is tried; any other failure stops
//! the loop at that candidate so rate limits and auth failures are handled
//! by the caller instead of being masked by a different model.

use crate::error::{FallbackError, RunError, ServiceError};
use crate::events::{EventHandler, RunEvent};
use crate::{DEFAULT_MODELS, GenerationConfig, ModelInvoker};
use tracing::debug;

/// Non-empty, ordered list of model names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidates(Vec<String>);

impl ModelCandidates {
    /// Build a candidate list. Blank names are dropped; an empty result is
    /// a configuration error.
    pub fn new<I, S>(models: I) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<String> = models
            .into_iter()
            .map(Into::into)
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
        if models.is_empty() {
            return Err(RunError::InvalidConfig(
                "at least one model name is required".to_string(),
            ));
        }
        Ok(Self(models))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a list built by [`ModelCandidates::new`].
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn primary(&self) -> &str {
        &self.0[0]
    }
}

impl Default for ModelCandidates {
    fn default() -> Self {
        Self(DEFAULT_MODELS.iter().map(|m| (*m).to_string()).collect())
    }
}

/// Text returned by the first candidate that answered.
#[derive(Debug, Clone)]
pub struct FallbackResponse {
    pub text: String,
    pub model: String,
}

/// Try each candidate in order until one answers.
///
/// - `NotFound` advances to the next candidate.
/// - Any other error is returned immediately; later candidates are not tried.
/// - If every candidate is `NotFound`, returns [`FallbackError::Exhausted`].
pub async fn generate_with_fallback(
    invoker: &dyn ModelInvoker,
    candidates: &ModelCandidates,
    prompt: &str,
    config: &GenerationConfig,
    event_handler: &dyn EventHandler,
) -> Result<FallbackResponse, FallbackError> {
    let mut tried = Vec::with_capacity(candidates.len());

    for (idx, model) in candidates.as_slice().iter().enumerate() {
        debug!("Trying model {model} ({}/{})", idx + 1, candidates.len());
        match invoker.generate(model, prompt, config).await {
            Ok(text) => {
                event_handler.on_event(&RunEvent::ModelResponded {
                    model,
                    chars: text.chars().count(),
                });
                return Ok(FallbackResponse {
                    text,
                    model: model.clone(),
                });
            }
            Err(err @ ServiceError::NotFound { .. }) => {
                let reason = err.to_string();
                event_handler.on_event(&RunEvent::ModelUnavailable {
                    model,
                    reason: &reason,
                    remaining: candidates.len() - idx - 1,
                });
                tried.push(model.clone());
            }
            Err(err) => return Err(FallbackError::Service(err)),
        }
    }

    Err(FallbackError::Exhausted { tried })
}
