//! The model invocation seam.
//!
//! [`ModelInvoker`] issues exactly one request to exactly one model and
//! returns its raw text or a classified [`ServiceError`]. Fallback and retry
//! are layered on top in [`super::fallback`] and [`super::retry`], so an
//! implementation never retries on its own.

use futures::future::BoxFuture;
use tracing::trace;

use crate::{GeminiClient, GenerateContentRequest, GenerationConfig, ServiceError};

/// Boxed future returned by [`ModelInvoker::generate`].
pub type GenerateFuture<'a> = BoxFuture<'a, Result<String, ServiceError>>;

/// One request, one model, classified failure.
pub trait ModelInvoker: Send + Sync {
    /// Send `prompt` to `model` with the given generation parameters and
    /// return the response text unmodified.
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        config: &'a GenerationConfig,
    ) -> GenerateFuture<'a>;
}

impl ModelInvoker for GeminiClient {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        config: &'a GenerationConfig,
    ) -> GenerateFuture<'a> {
        Box::pin(async move {
            let body = GenerateContentRequest::single_prompt(prompt, config);
            let generation = self.generate_content(model, &body).await?;
            trace!(
                "Generation finished: reason={}",
                generation.finish_reason.as_deref().unwrap_or("-")
            );
            Ok(generation.text)
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted invoker for unit tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued results in order and records which model each call
    /// targeted. An exhausted script fails with [`ServiceError::Other`].
    #[derive(Default)]
    pub(crate) struct ScriptedInvoker {
        script: Mutex<VecDeque<Result<String, ServiceError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        pub(crate) fn new(script: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ModelInvoker for ScriptedInvoker {
        fn generate<'a>(
            &'a self,
            model: &'a str,
            _prompt: &'a str,
            _config: &'a GenerationConfig,
        ) -> GenerateFuture<'a> {
            self.calls.lock().unwrap().push(model.to_string());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Other("script exhausted".into())));
            Box::pin(async move { next })
        }
    }

    pub(crate) fn not_found(model: &str) -> ServiceError {
        ServiceError::NotFound {
            model: model.to_string(),
            message: format!("models/{model} is not found"),
        }
    }

    pub(crate) fn rate_limited(model: &str) -> ServiceError {
        ServiceError::RateLimited {
            model: model.to_string(),
            message: "HTTP 429: Resource has been exhausted".into(),
        }
    }
}
