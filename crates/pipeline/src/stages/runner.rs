//! The single call template every generation stage goes through.
//!
//! Build prompt → invoke the provider under a timeout → clean the output →
//! reject empty output. Events and tracing spans are emitted here so that
//! individual stages never log their own provider calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use storyloom_config::LlmConfig;
use storyloom_core::{
    Error, EventBus, Message, PipelineEvent, Provider, ProviderError, ProviderRequest, Result, Stage,
    ValidationError,
};
use tracing::{debug, info, warn};

/// Model parameters shared by all stages.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl GenerationSettings {
    pub fn from_config(llm: &LlmConfig) -> Self {
        Self {
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            timeout_secs: llm.timeout_secs,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

/// A rendered prompt: the writer's role plus the task.
#[derive(Debug, Clone)]
pub struct StagePrompt {
    pub system: String,
    pub user: String,
}

impl StagePrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Runs one LLM call for one stage.
#[derive(Clone)]
pub struct StageRunner {
    provider: Arc<dyn Provider>,
    settings: GenerationSettings,
    events: Arc<EventBus>,
}

impl StageRunner {
    pub fn new(provider: Arc<dyn Provider>, settings: GenerationSettings, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn artifact_saved(&self, artifact: impl Into<String>) {
        self.events.publish(PipelineEvent::ArtifactSaved {
            artifact: artifact.into(),
            timestamp: Utc::now(),
        });
    }

    /// Invoke the provider for `stage` and return cleaned, non-empty text.
    pub async fn run(&self, stage: Stage, chapter: Option<u32>, prompt: StagePrompt) -> Result<String> {
        self.events.publish(PipelineEvent::StageStarted {
            stage,
            chapter,
            timestamp: Utc::now(),
        });
        info!(
            stage = stage.as_str(),
            chapter,
            model = %self.settings.model,
            prompt_chars = prompt.user.chars().count(),
            "Stage started"
        );

        let started = Instant::now();
        let result = self.call(stage, prompt).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(text) => {
                let output_chars = text.chars().count();
                info!(stage = stage.as_str(), chapter, output_chars, duration_ms, "Stage completed");
                self.events.publish(PipelineEvent::StageCompleted {
                    stage,
                    chapter,
                    output_chars,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                warn!(stage = stage.as_str(), chapter, error = %e, "Stage failed");
                self.events.publish(PipelineEvent::StageFailed {
                    stage,
                    chapter,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn call(&self, stage: Stage, prompt: StagePrompt) -> Result<String> {
        let request = ProviderRequest {
            model: self.settings.model.clone(),
            messages: vec![Message::system(prompt.system), Message::user(prompt.user)],
            temperature: self.settings.temperature,
            max_tokens: Some(self.settings.max_tokens),
            stop: vec![],
        };

        let timeout_secs = self.settings.timeout_secs;
        let response = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.provider.complete(request),
        )
        .await
        .map_err(|_| ProviderError::Timeout { timeout_secs })??;

        if let Some(usage) = &response.usage {
            debug!(
                stage = stage.as_str(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        let text = clean_output(&response.message.content);
        if text.is_empty() {
            return Err(Error::Validation(ValidationError::EmptyOutput {
                stage: stage.to_string(),
            }));
        }
        Ok(text)
    }
}

/// Remove reasoning blocks and a wrapping code fence, then trim.
pub fn clean_output(raw: &str) -> String {
    let mut text = raw.to_string();
    for tag in ["think", "thinking"] {
        text = strip_tag_blocks(&text, tag);
    }
    strip_fence(text.trim()).trim().to_string()
}

fn strip_tag_blocks(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(&open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(&close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            // Unterminated block: the model never finished reasoning.
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn strip_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return text;
    };
    // Drop the language tag line, if any.
    match inner.split_once('\n') {
        Some((first, body)) if !first.trim().contains(' ') => body,
        _ => inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, SlowProvider};

    fn runner(provider: Arc<dyn Provider>) -> StageRunner {
        StageRunner::new(provider, GenerationSettings::default(), Arc::new(EventBus::default()))
    }

    #[test]
    fn strips_reasoning_and_fences() {
        assert_eq!(clean_output("<think>plan</think>\nHello"), "Hello");
        assert_eq!(clean_output("a<thinking>x</thinking>b"), "ab");
        assert_eq!(clean_output("```text\nChapter 1 - A\n```"), "Chapter 1 - A");
        assert_eq!(clean_output("```\nplain\n```"), "plain");
        assert_eq!(clean_output("<think>never closed"), "");
        assert_eq!(clean_output("  keep ``` inside  "), "keep ``` inside");
    }

    #[tokio::test]
    async fn run_returns_clean_text_and_publishes_events() {
        let provider = Arc::new(ScriptedProvider::new(["<think>hm</think> The premise."]));
        let runner = runner(provider.clone());
        let mut rx = runner.events().subscribe();

        let text = runner
            .run(Stage::Architecture, None, StagePrompt::new("sys", "user"))
            .await
            .unwrap();
        assert_eq!(text, "The premise.");

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.as_ref(), PipelineEvent::StageStarted { stage: Stage::Architecture, .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.as_ref(), PipelineEvent::StageCompleted { output_chars: 12, .. }));

        let request = &provider.requests()[0];
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_tokens, Some(8192));
    }

    #[tokio::test]
    async fn empty_output_is_validation_error() {
        let runner = runner(Arc::new(ScriptedProvider::new(["<think>only thoughts</think>"])));
        let mut rx = runner.events().subscribe();
        let err = runner
            .run(Stage::Draft, Some(2), StagePrompt::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::EmptyOutput { .. })));

        rx.recv().await.unwrap();
        let failed = rx.recv().await.unwrap();
        assert!(matches!(failed.as_ref(), PipelineEvent::StageFailed { chapter: Some(2), .. }));
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::RateLimited { retry_after_secs: 3 }));
        let err = runner(provider)
            .run(Stage::Blueprint, None, StagePrompt::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::RateLimited { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let settings = GenerationSettings {
            timeout_secs: 2,
            ..GenerationSettings::default()
        };
        let runner = StageRunner::new(Arc::new(SlowProvider), settings, Arc::new(EventBus::default()));
        let err = runner
            .run(Stage::Draft, Some(1), StagePrompt::new("s", "u"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout { timeout_secs: 2 })));
    }
}
