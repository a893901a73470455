//! Run lifecycle events and handlers.
//!
//! The retry orchestrator and fallback loop report what they decide through
//! [`RunEvent`] values. Implement [`EventHandler`] to observe them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or silent runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures (recording events in tests) |

use std::time::Duration;
use tracing::{debug, info, warn};

/// Events emitted while a prompt is being answered.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// A new attempt is starting (1-based).
    AttemptStarted { attempt: u32, max_attempts: u32 },
    /// A candidate model reported itself unavailable; `remaining` candidates
    /// are left to try in this attempt.
    ModelUnavailable {
        model: &'a str,
        reason: &'a str,
        remaining: usize,
    },
    /// A candidate model answered with `chars` characters of text.
    ModelResponded { model: &'a str, chars: usize },
    /// The attempt was rate limited; the orchestrator sleeps for `delay`
    /// before attempt `attempt + 1`.
    CooldownStarted {
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        reason: &'a str,
    },
    /// The response parsed as a JSON object with `entries` top-level keys.
    ResponseParsed { entries: usize },
}

/// Handler for run events.
pub trait EventHandler: Send + Sync {
    /// Called for each event. The default implementation ignores it.
    fn on_event(&self, event: &RunEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let cooldowns = Mutex::new(Vec::new());
/// let handler = FnEventHandler::new(|event| {
///     if let RunEvent::CooldownStarted { delay, .. } = event {
///         cooldowns.lock().unwrap().push(*delay);
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&RunEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent<'_>) {
        (self.0)(event)
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                info!("[attempt {attempt}/{max_attempts}] requesting assessment");
            }
            RunEvent::ModelUnavailable {
                model,
                reason,
                remaining,
            } => {
                if *remaining > 0 {
                    warn!("Model {model} unavailable ({reason}); trying next of {remaining}");
                } else {
                    warn!("Model {model} unavailable ({reason}); no candidates left");
                }
            }
            RunEvent::ModelResponded { model, chars } => {
                debug!("Model {model} responded with {chars} chars");
            }
            RunEvent::CooldownStarted {
                attempt,
                max_attempts,
                delay,
                reason,
            } => {
                warn!(
                    "Rate limited on attempt {attempt}/{max_attempts} ({reason}). \
                     Waiting {}s before retrying...",
                    delay.as_secs_f64()
                );
            }
            RunEvent::ResponseParsed { entries } => {
                debug!("Response parsed: {entries} top-level entries");
            }
        }
    }
}
