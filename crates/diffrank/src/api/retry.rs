//! Bounded retry with a fixed cooldown on rate limits.
//!
//! Each attempt runs the full model-fallback loop and then parses the
//! response. The attempt either succeeds, waits out a rate limit and tries
//! again, or fails the run:
//!
//! | Outcome of the attempt | Next state |
//! |------------------------|------------|
//! | Text parses as a JSON object | `Success` |
//! | `RateLimited`, attempt < max | `RetryableFailure` → sleep → `Attempting` |
//! | `RateLimited`, attempt == max | `FatalFailure` ([`RunError::QuotaExceeded`]) |
//! | Every candidate `NotFound` | `FatalFailure` ([`RunError::ModelsExhausted`]) |
//! | Any other service error | `FatalFailure` ([`RunError::Service`]) |
//! | Text is not a JSON object | `FatalFailure` ([`RunError::ResponseParse`]) |
//!
//! A malformed response ends the run at once; it does not use up the
//! remaining attempts. Every attempt starts again from the first candidate.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::fallback::{ModelCandidates, generate_with_fallback};
use crate::error::{FallbackError, RunError, ServiceError};
use crate::events::{EventHandler, NoopHandler, RunEvent};
use crate::output;
use crate::prompt::Prompt;
use crate::{GenerationConfig, ModelInvoker};

/// Default number of attempts, counting the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wait after a rate-limited attempt.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts including the first (must be ≥ 1).
    pub max_attempts: u32,
    /// Fixed delay before retrying a rate-limited attempt.
    pub cooldown: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given attempt ceiling and the default cooldown.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Worst-case time spent sleeping across all attempts.
    pub fn max_total_cooldown(&self) -> Duration {
        self.cooldown * self.max_attempts.saturating_sub(1)
    }

    /// Decide what a failed attempt leads to.
    pub fn on_failure(&self, attempt: u32, error: FallbackError) -> FailureDisposition {
        match error {
            FallbackError::Exhausted { tried } => {
                FailureDisposition::Fatal(RunError::ModelsExhausted { tried })
            }
            FallbackError::Service(source @ ServiceError::RateLimited { .. }) => {
                if attempt < self.max_attempts {
                    FailureDisposition::RetryAfter {
                        delay: self.cooldown,
                        source,
                    }
                } else {
                    FailureDisposition::Fatal(RunError::QuotaExceeded {
                        attempts: attempt,
                        source,
                    })
                }
            }
            FallbackError::Service(source) => {
                FailureDisposition::Fatal(RunError::Service { attempt, source })
            }
        }
    }
}

/// What happens after a failed attempt.
#[derive(Debug)]
pub enum FailureDisposition {
    /// Sleep for `delay`, then start the next attempt.
    RetryAfter { delay: Duration, source: ServiceError },
    /// Stop the run with this error.
    Fatal(RunError),
}

/// A successful attempt: the parsed response and where it came from.
#[derive(Debug, Clone)]
pub struct Assessed {
    pub assessments: Map<String, Value>,
    /// Model that produced the response.
    pub model: String,
    /// Attempt number (1-based) that succeeded.
    pub attempts: u32,
}

/// Drives [`generate_with_fallback`] through the attempt state machine.
pub struct RetryOrchestrator<'a> {
    invoker: &'a dyn ModelInvoker,
    candidates: &'a ModelCandidates,
    generation: &'a GenerationConfig,
    retry: &'a RetryConfig,
    event_handler: &'a dyn EventHandler,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(
        invoker: &'a dyn ModelInvoker,
        candidates: &'a ModelCandidates,
        generation: &'a GenerationConfig,
        retry: &'a RetryConfig,
    ) -> Self {
        Self {
            invoker,
            candidates,
            generation,
            retry,
            event_handler: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    /// Run attempts until one succeeds or a fatal condition is reached.
    pub async fn run(&self, prompt: &Prompt) -> Result<Assessed, RunError> {
        if self.retry.max_attempts == 0 {
            return Err(RunError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let mut attempt = 1;
        loop {
            self.event_handler.on_event(&RunEvent::AttemptStarted {
                attempt,
                max_attempts: self.retry.max_attempts,
            });

            let result = generate_with_fallback(
                self.invoker,
                self.candidates,
                prompt.as_str(),
                self.generation,
                self.event_handler,
            )
            .await;

            match result {
                Ok(response) => {
                    let assessments = output::parse_assessments(&response.text)?;
                    self.event_handler.on_event(&RunEvent::ResponseParsed {
                        entries: assessments.len(),
                    });
                    debug!(
                        "Attempt {attempt} succeeded with model {} ({} entries)",
                        response.model,
                        assessments.len()
                    );
                    return Ok(Assessed {
                        assessments,
                        model: response.model,
                        attempts: attempt,
                    });
                }
                Err(error) => match self.retry.on_failure(attempt, error) {
                    FailureDisposition::RetryAfter { delay, source } => {
                        let reason = source.to_string();
                        self.event_handler.on_event(&RunEvent::CooldownStarted {
                            attempt,
                            max_attempts: self.retry.max_attempts,
                            delay,
                            reason: &reason,
                        });
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    FailureDisposition::Fatal(err) => {
                        warn!(
                            "Attempt {attempt}/{} failed: {err}",
                            self.retry.max_attempts
                        );
                        return Err(err);
                    }
                },
            }
        }
    }
}
