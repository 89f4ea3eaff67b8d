//! Enrichment stage: expand a short chapter toward its target length.

use storyloom_core::{length, Result, Stage, StateError};
use tracing::info;

use super::{require_positive, StageRunner};
use crate::project::ProjectState;
use crate::prompts;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichOutcome {
    Enriched {
        text: String,
        before: usize,
        after: usize,
    },
    /// The text already reaches the threshold; no call was made.
    NotNeeded { measured: usize, threshold: usize },
}

impl EnrichOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Enriched { text, .. } => Some(text),
            Self::NotNeeded { .. } => None,
        }
    }
}

pub struct EnrichmentGenerator {
    runner: StageRunner,
}

impl EnrichmentGenerator {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    /// Expand `text` if it is under the enrichment threshold. Nothing is persisted.
    pub async fn enrich(&self, chapter: u32, text: &str, target_words: u32, language: &str) -> Result<EnrichOutcome> {
        require_positive("target words", target_words)?;
        if text.trim().is_empty() {
            return Err(StateError::EmptyChapter(chapter).into());
        }

        let measured = length::measure(text);
        let threshold = length::threshold_for(target_words);
        if !length::is_below_threshold(measured, target_words) {
            self.runner.events().notice(format!(
                "Chapter {chapter} has {measured} words (threshold {threshold}); enrichment not needed"
            ));
            return Ok(EnrichOutcome::NotNeeded { measured, threshold });
        }

        let prompt = prompts::enrichment(text, measured, target_words, language);
        let enriched = self.runner.run(Stage::Enrichment, Some(chapter), prompt).await?;
        let after = length::measure(&enriched);
        info!(chapter, before = measured, after, target_words, "Chapter enriched");

        Ok(EnrichOutcome::Enriched {
            text: enriched,
            before: measured,
            after,
        })
    }

    /// Enrich the chapter file in place.
    pub async fn enrich_chapter(
        &self,
        project: &mut ProjectState,
        chapter: u32,
        target_words: u32,
        language: &str,
    ) -> Result<EnrichOutcome> {
        let text = project.require_chapter_text(chapter)?;
        let outcome = self.enrich(chapter, &text, target_words, language).await?;
        if let Some(enriched) = outcome.text() {
            let path = project.write_chapter(chapter, enriched)?;
            self.runner.artifact_saved(path.display().to_string());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{project_without_embedder, runner, ScriptedProvider};
    use std::sync::Arc;
    use storyloom_core::Error;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[tokio::test]
    async fn short_text_is_expanded() {
        let provider = Arc::new(ScriptedProvider::new([words(30)]));
        let outcome = EnrichmentGenerator::new(runner(provider.clone()))
            .enrich(1, &words(20), 30, "")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EnrichOutcome::Enriched {
                text: words(30),
                before: 20,
                after: 30
            }
        );
        assert!(provider.user_prompt(0).contains("80%"));
    }

    #[tokio::test]
    async fn long_enough_text_skips_call() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let outcome = EnrichmentGenerator::new(runner(provider.clone()))
            .enrich(1, &words(25), 30, "")
            .await
            .unwrap();
        assert_eq!(outcome, EnrichOutcome::NotNeeded { measured: 25, threshold: 24 });
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn chapter_file_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_without_embedder(dir.path());
        project.write_chapter(2, &words(5)).unwrap();
        let provider = Arc::new(ScriptedProvider::new([words(12)]));

        EnrichmentGenerator::new(runner(provider))
            .enrich_chapter(&mut project, 2, 10, "")
            .await
            .unwrap();
        assert_eq!(project.require_chapter_text(2).unwrap(), words(12));
    }

    #[tokio::test]
    async fn missing_chapter_is_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_without_embedder(dir.path());
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let err = EnrichmentGenerator::new(runner(provider))
            .enrich_chapter(&mut project, 4, 10, "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::State(StateError::ChapterMissing(4))));
    }
}
