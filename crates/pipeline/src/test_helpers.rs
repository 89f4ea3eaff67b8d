//! Shared test helpers for pipeline tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use storyloom_core::{
    Blueprint, ChapterEntry, EmbeddingRequest, EmbeddingResponse, EventBus, Message, Provider,
    ProviderError, ProviderRequest, ProviderResponse, Usage,
};
use storyloom_knowledge::{InMemoryBackend, KnowledgeStore};

use crate::project::ProjectState;
use crate::stages::{GenerationSettings, StageRunner};

/// A mock provider that returns a sequence of scripted completions.
///
/// Each call to `complete` pops the next entry from the queue and records
/// the request. Panics if more calls are made than responses provided.
/// Embeddings are letter frequencies; inputs containing "POISON" fail.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    embed_calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(responses.into_iter().map(|s| Ok(s.into())))
    }

    pub fn from_results(results: impl IntoIterator<Item = Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(results.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            embed_calls: Mutex::new(0),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::from_results([Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn embed_calls(&self) -> usize {
        *self.embed_calls.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The user message of the `index`-th completion request.
    pub fn user_prompt(&self, index: usize) -> String {
        self.requests()[index]
            .messages
            .iter()
            .rev()
            .find(|m| m.role == storyloom_core::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

pub fn letters(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 26];
    for c in text.to_ascii_lowercase().chars() {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let next = self.responses.lock().unwrap().pop_front();
        let Some(next) = next else {
            panic!("ScriptedProvider: no more responses (call #{call})");
        };
        next.map(|text| ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        *self.embed_calls.lock().unwrap() += 1;
        if request.inputs.iter().any(|i| i.contains("POISON")) {
            return Err(ProviderError::ApiError {
                status_code: 400,
                message: "rejected input".into(),
            });
        }
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|i| letters(i)).collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowProvider;

#[async_trait::async_trait]
impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ProviderResponse {
            message: Message::assistant("too late"),
            usage: None,
            model: "slow".into(),
        })
    }
}

pub fn runner(provider: Arc<ScriptedProvider>) -> StageRunner {
    StageRunner::new(provider, GenerationSettings::default(), Arc::new(EventBus::default()))
}

/// A project whose knowledge store embeds through `provider`.
pub fn project(dir: &Path, provider: Arc<ScriptedProvider>) -> ProjectState {
    let store = KnowledgeStore::new(Arc::new(InMemoryBackend::new()))
        .with_embedder(provider, "letters-v1")
        .with_chunk_chars(120);
    ProjectState::open(dir, store).unwrap()
}

/// A project without an embedder.
pub fn project_without_embedder(dir: &Path) -> ProjectState {
    ProjectState::open(dir, KnowledgeStore::new(Arc::new(InMemoryBackend::new()))).unwrap()
}

pub fn blueprint(n: u32) -> Blueprint {
    Blueprint::new(
        (1..=n)
            .map(|i| {
                let mut entry = ChapterEntry::new(i, format!("Chapter title {i}"), format!("Mara travels to Dunmere, step {i}."));
                entry.purpose = format!("purpose {i}");
                entry
            })
            .collect(),
    )
}

/// Blueprint text covering `start..=end`, as a model would answer.
pub fn blueprint_text(start: u32, end: u32) -> String {
    Blueprint::new(
        (start..=end)
            .map(|i| ChapterEntry::new(i, format!("Title {i}"), format!("Events of chapter {i}.")))
            .collect(),
    )
    .render()
}
