//! Convenience re-exports for common `diffrank` types.
//!
//! ```ignore
//! use diffrank::prelude::*;
//! ```

pub use crate::api::{ModelCandidates, ModelInvoker, RetryConfig, RetryOrchestrator};
pub use crate::config::RunConfig;
pub use crate::error::{FallbackError, RunError, ServiceError};
pub use crate::events::{EventHandler, FnEventHandler, LoggingHandler, NoopHandler, RunEvent};
pub use crate::prompt::{Prompt, PromptBuilder};
pub use crate::run::{RunSummary, execute};
pub use crate::{GeminiClient, GenerationConfig};
