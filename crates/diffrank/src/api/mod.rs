//! Service interaction layer: the invoker seam, model fallback, and retry.
//!
//! - [`invoker`]: the [`ModelInvoker`] trait (one request, one model,
//!   classified error) and its implementation for
//!   [`GeminiClient`](crate::GeminiClient).
//! - [`fallback`]: tries [`ModelCandidates`] in order, moving on only when a
//!   model is not found.
//! - [`retry`]: the attempt state machine: fixed cooldown on rate limits,
//!   fail fast on everything else.

pub mod fallback;
pub mod invoker;
pub mod retry;

pub use fallback::{FallbackResponse, ModelCandidates, generate_with_fallback};
pub use invoker::{GenerateFuture, ModelInvoker};
pub use retry::{Assessed, FailureDisposition, RetryConfig, RetryOrchestrator};
