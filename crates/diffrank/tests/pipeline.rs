//! End-to-end tests for the scoring pipeline.
//!
//! A scripted [`ModelInvoker`] stands in for the Gemini service; inputs and
//! outputs live in a temporary directory.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use diffrank::api::GenerateFuture;
use diffrank::prelude::*;
use diffrank::prompt::{NO_CHANGES_FALLBACK, TRUNCATION_MARKER};

const VALID: &str = r#"{
    "TC-1": {"relevance": 0.95, "complexity": 0.6, "change_nature": "logic_change"},
    "TC-2": {"relevance": 0.1, "complexity": 0.2, "change_nature": "none"}
}"#;

/// Replays queued results and records every call.
#[derive(Default)]
struct ScriptedInvoker {
    script: Mutex<VecDeque<Result<String, ServiceError>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedInvoker {
    fn new(script: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn models_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    fn last_prompt(&self) -> String {
        self.calls.lock().unwrap().last().map(|(_, p)| p.clone()).unwrap_or_default()
    }
}

impl ModelInvoker for ScriptedInvoker {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        _config: &'a GenerationConfig,
    ) -> GenerateFuture<'a> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Other("script exhausted".into())));
        Box::pin(async move { next })
    }
}

fn not_found(model: &str) -> ServiceError {
    ServiceError::NotFound {
        model: model.into(),
        message: format!("models/{model} is not found for API version v1beta"),
    }
}

fn rate_limited(model: &str) -> ServiceError {
    ServiceError::RateLimited {
        model: model.into(),
        message: "429 Resource has been exhausted (e.g. check quota).".into(),
    }
}

fn workspace(diff: Option<&str>, test_cases: Option<&str>) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    if let Some(diff) = diff {
        std::fs::write(dir.path().join("dff.txt"), diff).unwrap();
    }
    if let Some(test_cases) = test_cases {
        std::fs::write(dir.path().join("test_case.txt"), test_cases).unwrap();
    }
    dir
}

fn config_for(dir: &Path) -> RunConfig {
    RunConfig::in_dir(dir).with_models(["model-a", "model-b"])
}

fn read_output(dir: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join("llm.txt")).unwrap();
    serde_json::from_str(&text).unwrap()
}

// ── Happy paths ─────────────────────────────────────────────────────

#[tokio::test]
async fn writes_model_response_to_output() {
    let dir = workspace(Some("+ fn login() {}"), Some("TC-1: login\nTC-2: logout"));
    let invoker = ScriptedInvoker::new(vec![Ok(VALID.into())]);

    let summary = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap();

    assert_eq!(summary.entries, 2);
    assert_eq!(summary.model, "model-a");
    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.nonconforming, 0);
    assert!(!summary.diff_truncated);

    let out = read_output(dir.path());
    assert_eq!(out["TC-1"]["change_nature"], "logic_change");
    assert_eq!(out["TC-2"]["relevance"], 0.1);

    let prompt = invoker.last_prompt();
    assert!(prompt.contains("+ fn login() {}"));
    assert!(prompt.contains("TC-2: logout"));
}

#[tokio::test]
async fn not_found_falls_back_to_next_model() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![Err(not_found("model-a")), Ok(VALID.into())]);

    let summary = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap();

    assert_eq!(summary.model, "model-b");
    assert_eq!(invoker.models_called(), vec!["model-a", "model-b"]);
    assert_eq!(read_output(dir.path())["TC-1"]["relevance"], 0.95);
}

#[tokio::test(start_paused = true)]
async fn two_rate_limits_then_success_sleeps_twice() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![
        Err(rate_limited("model-a")),
        Err(rate_limited("model-a")),
        Ok(VALID.into()),
    ]);
    let cooldowns = Mutex::new(Vec::new());
    let handler = FnEventHandler::new(|event| {
        if let RunEvent::CooldownStarted { delay, .. } = event {
            cooldowns.lock().unwrap().push(*delay);
        }
    });

    let summary = execute(&config_for(dir.path()), &invoker, &handler)
        .await
        .unwrap();

    assert_eq!(summary.attempts, 3);
    assert_eq!(
        *cooldowns.lock().unwrap(),
        vec![Duration::from_secs(30), Duration::from_secs(30)]
    );
    assert_eq!(read_output(dir.path())["TC-2"]["change_nature"], "none");
}

#[tokio::test]
async fn fenced_response_is_persisted_without_fences() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![Ok(format!("```json\n{VALID}\n```"))]);

    execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("llm.txt")).unwrap();
    assert!(!raw.contains("```"));
    assert_eq!(read_output(dir.path())["TC-1"]["complexity"], 0.6);
}

#[tokio::test]
async fn missing_diff_uses_fallback_text() {
    let dir = workspace(None, Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![Ok(VALID.into())]);

    execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap();

    assert!(invoker.last_prompt().contains(NO_CHANGES_FALLBACK));
}

#[tokio::test]
async fn oversized_diff_is_truncated_in_prompt() {
    let diff = "x".repeat(50);
    let dir = workspace(Some(&diff), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![Ok(VALID.into())]);
    let config = config_for(dir.path()).with_max_diff_chars(20);

    let summary = execute(&config, &invoker, &NoopHandler).await.unwrap();

    assert!(summary.diff_truncated);
    let prompt = invoker.last_prompt();
    assert!(prompt.contains(&format!("{}{TRUNCATION_MARKER}", "x".repeat(20))));
    assert!(!prompt.contains(&"x".repeat(21)));
}

#[tokio::test]
async fn nonconforming_entries_are_counted_but_written() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let response = r#"{"TC-1": {"relevance": 3, "complexity": 0.1, "change_nature": "none"}}"#;
    let invoker = ScriptedInvoker::new(vec![Ok(response.into())]);

    let summary = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap();

    assert_eq!(summary.nonconforming, 1);
    assert_eq!(read_output(dir.path())["TC-1"]["relevance"], 3);
}

// ── Failure paths ───────────────────────────────────────────────────

#[tokio::test]
async fn missing_test_cases_fails_before_any_call() {
    let dir = workspace(Some("diff"), None);
    let invoker = ScriptedInvoker::new(vec![Ok(VALID.into())]);

    let err = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::MissingRequiredInput { .. }), "{err:?}");
    assert!(invoker.models_called().is_empty());
    assert!(!dir.path().join("llm.txt").exists());
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limit_leaves_previous_output_untouched() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    std::fs::write(dir.path().join("llm.txt"), "previous run").unwrap();
    let invoker = ScriptedInvoker::new(vec![
        Err(rate_limited("model-a")),
        Err(rate_limited("model-a")),
        Err(rate_limited("model-a")),
    ]);

    let err = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::QuotaExceeded { attempts: 3, .. }), "{err:?}");
    assert_eq!(invoker.models_called().len(), 3);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("llm.txt")).unwrap(),
        "previous run"
    );
}

#[tokio::test]
async fn invalid_json_fails_without_writing() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![Ok("Here are the scores: TC-1 high".into())]);

    let err = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::ResponseParse { .. }), "{err:?}");
    assert_eq!(invoker.models_called().len(), 1);
    assert!(!dir.path().join("llm.txt").exists());
}

#[tokio::test]
async fn every_model_missing_is_fatal() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![Err(not_found("model-a")), Err(not_found("model-b"))]);

    let err = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap_err();

    match err {
        RunError::ModelsExhausted { tried } => assert_eq!(tried, vec!["model-a", "model-b"]),
        other => panic!("expected ModelsExhausted, got {other:?}"),
    }
    assert!(!dir.path().join("llm.txt").exists());
}

#[tokio::test]
async fn auth_failure_is_fatal_without_fallback_or_retry() {
    let dir = workspace(Some("diff"), Some("TC-1"));
    let invoker = ScriptedInvoker::new(vec![
        Err(ServiceError::Other(
            "Gemini API HTTP 400: API key not valid".into(),
        )),
        Ok(VALID.into()),
    ]);

    let err = execute(&config_for(dir.path()), &invoker, &NoopHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Service { attempt: 1, .. }), "{err:?}");
    assert_eq!(invoker.models_called(), vec!["model-a"]);
}

#[tokio::test]
async fn invalid_config_fails_before_reading_inputs() {
    let dir = workspace(None, None);
    let invoker = ScriptedInvoker::default();
    let config = config_for(dir.path()).with_max_attempts(0);

    let err = execute(&config, &invoker, &NoopHandler).await.unwrap_err();

    assert!(matches!(err, RunError::InvalidConfig(_)), "{err:?}");
    assert!(invoker.models_called().is_empty());
}
