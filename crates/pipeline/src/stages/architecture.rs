//! Architecture stage: topic in, premise / conflict / world rules / arcs out.

use storyloom_core::{Result, Stage, ValidationError};

use super::{require_positive, StageRunner};
use crate::prompts::{self, ArchitectureInput};

#[derive(Debug, Clone, Default)]
pub struct ArchitectureRequest {
    pub topic: String,
    pub genre: String,
    pub chapters: u32,
    pub words_per_chapter: u32,
    pub guidance: String,
    pub language: String,
}

pub struct ArchitectureGenerator {
    runner: StageRunner,
}

impl ArchitectureGenerator {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    /// Generate the architecture text. The caller decides whether to persist it.
    pub async fn generate(&self, request: &ArchitectureRequest) -> Result<String> {
        if request.topic.trim().is_empty() {
            return Err(ValidationError::InvalidParameter("topic must not be empty".into()).into());
        }
        require_positive("chapter count", request.chapters)?;
        require_positive("words per chapter", request.words_per_chapter)?;

        let prompt = prompts::architecture(&ArchitectureInput {
            topic: &request.topic,
            genre: &request.genre,
            chapters: request.chapters,
            words_per_chapter: request.words_per_chapter,
            guidance: &request.guidance,
            language: &request.language,
        });
        self.runner.run(Stage::Architecture, None, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{runner, ScriptedProvider};
    use std::sync::Arc;
    use storyloom_core::Error;

    fn request() -> ArchitectureRequest {
        ArchitectureRequest {
            topic: "A cartographer maps a city that rearranges itself".into(),
            genre: "fantasy".into(),
            chapters: 10,
            words_per_chapter: 3000,
            ..ArchitectureRequest::default()
        }
    }

    #[tokio::test]
    async fn generates_from_topic() {
        let provider = Arc::new(ScriptedProvider::new(["Premise: maps lie.\nConflict: ..."]));
        let text = ArchitectureGenerator::new(runner(provider.clone()))
            .generate(&request())
            .await
            .unwrap();
        assert!(text.starts_with("Premise"));
        assert!(provider.user_prompt(0).contains("cartographer"));
    }

    #[tokio::test]
    async fn empty_topic_rejected_without_call() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let err = ArchitectureGenerator::new(runner(provider.clone()))
            .generate(&ArchitectureRequest {
                topic: "  ".into(),
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::InvalidParameter(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_chapters_rejected() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let result = ArchitectureGenerator::new(runner(provider))
            .generate(&ArchitectureRequest {
                chapters: 0,
                ..request()
            })
            .await;
        assert!(result.is_err());
    }
}
