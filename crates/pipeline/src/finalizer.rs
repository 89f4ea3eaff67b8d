//! Chapter finalization: commit the text and fold it into long-term state.
//!
//! Steps, each recorded in the ledger as soon as it succeeds:
//!
//! 1. persist the chapter file
//! 2. merge it into the global summary
//! 3. update the character state
//! 4. update the plot arcs
//! 5. replace the chapter's knowledge store entries
//!
//! Re-running with identical text resumes after the last completed step.
//! Changed text, or `force`, starts again from step 1.

use chrono::Utc;
use storyloom_core::{length, Error, PipelineEvent, Result, Stage, StateError};
use storyloom_knowledge::{InsertReport, SourceTag};
use tracing::{debug, info};

use crate::ledger::{content_hash, FinalizeStep};
use crate::project::ProjectState;
use crate::prompts;
use crate::stages::{require_positive, StageRunner};

#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub chapter: u32,
    pub target_words: u32,
    /// Text to commit; the chapter file is used when absent.
    pub text: Option<String>,
    pub force: bool,
}

impl FinalizeRequest {
    pub fn new(chapter: u32, target_words: u32) -> Self {
        Self {
            chapter,
            target_words,
            text: None,
            force: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    pub chapter: u32,
    pub steps_run: Vec<FinalizeStep>,
    pub steps_skipped: Vec<FinalizeStep>,
    pub measured_length: usize,
    pub threshold: usize,
    pub below_threshold: bool,
    /// Present when the knowledge step ran in this invocation.
    pub knowledge: Option<InsertReport>,
}

impl FinalizeOutcome {
    pub fn was_noop(&self) -> bool {
        self.steps_run.is_empty()
    }
}

pub struct Finalizer {
    runner: StageRunner,
}

impl Finalizer {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    /// Check every precondition without calling a provider. Returns the
    /// text that would be finalized.
    pub fn preflight(&self, project: &ProjectState, request: &FinalizeRequest) -> Result<String> {
        let chapter = request.chapter;
        require_positive("target words", request.target_words)?;
        if project.blueprint().is_some() {
            project.require_entry(chapter)?;
        }

        let text = match &request.text {
            Some(text) => text.clone(),
            None => project.require_chapter_text(chapter)?,
        };
        if text.trim().is_empty() {
            return Err(StateError::EmptyChapter(chapter).into());
        }
        if !project.knowledge().has_embedder() {
            return Err(Error::config(
                "finalizing needs an embedding provider to update the knowledge store",
            ));
        }
        Ok(text)
    }

    pub async fn finalize(&self, project: &mut ProjectState, request: &FinalizeRequest) -> Result<FinalizeOutcome> {
        let chapter = request.chapter;
        let text = self.preflight(project, request)?;

        let hash = content_hash(&text);
        let resumed = project.ledger_mut().begin(chapter, &hash, request.force);
        project.save_ledger()?;
        if resumed {
            debug!(chapter, "Resuming finalize from ledger");
        }

        let mut steps_run = Vec::new();
        let mut steps_skipped = Vec::new();
        let mut knowledge = None;

        for step in FinalizeStep::ALL {
            if project.ledger().is_done(chapter, step) {
                steps_skipped.push(step);
                continue;
            }

            match step {
                FinalizeStep::Persist => {
                    let path = project.write_chapter(chapter, &text)?;
                    self.runner.artifact_saved(path.display().to_string());
                }
                FinalizeStep::SummaryMerge => {
                    let prompt = prompts::summary_merge(project.global_summary(), chapter, &text);
                    let merged = self.runner.run(Stage::SummaryMerge, Some(chapter), prompt).await?;
                    let path = project.save_global_summary(&merged)?;
                    self.runner.artifact_saved(path.display().to_string());
                }
                FinalizeStep::CharacterUpdate => {
                    let prompt = prompts::character_update(project.character_state(), chapter, &text);
                    let updated = self.runner.run(Stage::CharacterUpdate, Some(chapter), prompt).await?;
                    let path = project.save_character_state(&updated)?;
                    self.runner.artifact_saved(path.display().to_string());
                }
                FinalizeStep::PlotArcs => {
                    let prompt = prompts::plot_arcs(project.plot_arcs(), chapter, &text);
                    let updated = self.runner.run(Stage::PlotArcs, Some(chapter), prompt).await?;
                    let path = project.save_plot_arcs(&updated)?;
                    self.runner.artifact_saved(path.display().to_string());
                }
                FinalizeStep::Knowledge => {
                    let source = SourceTag::chapter(chapter);
                    let removed = project.knowledge().remove_source(&source).await?;
                    let report = project.knowledge().insert(&text, source).await?;
                    debug!(chapter, removed, inserted = report.inserted, "Chapter knowledge replaced");
                    self.runner.events().publish(PipelineEvent::KnowledgeUpdated {
                        operation: "insert".into(),
                        inserted: report.inserted,
                        skipped: report.skipped.len(),
                        timestamp: Utc::now(),
                    });
                    knowledge = Some(report);
                }
            }

            project.ledger_mut().mark_done(chapter, step);
            project.save_ledger()?;
            steps_run.push(step);
        }

        let measured_length = length::measure(&text);
        let threshold = length::threshold_for(request.target_words);
        info!(
            chapter,
            steps_run = steps_run.len(),
            steps_skipped = steps_skipped.len(),
            measured_length,
            "Chapter finalized"
        );
        if steps_run.is_empty() {
            self.runner
                .events()
                .notice(format!("Chapter {chapter} is already finalized with this text"));
        }

        Ok(FinalizeOutcome {
            chapter,
            steps_run,
            steps_skipped,
            measured_length,
            threshold,
            below_threshold: measured_length < threshold,
            knowledge,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{blueprint, project, project_without_embedder, runner, ScriptedProvider};
    use std::sync::Arc;
    use storyloom_core::ProviderError;

    const TEXT: &str = "Mara found the silver key under the bell tower of Dunmere.";

    fn state_responses() -> Vec<String> {
        vec![
            "Mara found the silver key.".into(),
            "Mara:\n- Possessions: silver key".into(),
            "- [OPEN] what the key opens (since chapter 1)".into(),
        ]
    }

    #[tokio::test]
    async fn runs_all_steps_and_updates_state() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(state_responses()));
        let mut project = project(dir.path(), provider.clone());
        project.save_blueprint(blueprint(2)).unwrap();

        let mut request = FinalizeRequest::new(1, 3000);
        request.text = Some(TEXT.into());
        let outcome = Finalizer::new(runner(provider.clone()))
            .finalize(&mut project, &request)
            .await
            .unwrap();

        assert_eq!(outcome.steps_run, FinalizeStep::ALL.to_vec());
        assert!(outcome.below_threshold);
        assert_eq!(outcome.threshold, 2400);
        assert_eq!(project.require_chapter_text(1).unwrap(), TEXT);
        assert!(project.global_summary().contains("silver key"));
        assert!(project.character_state().contains("Possessions"));
        assert!(project.plot_arcs().contains("[OPEN]"));
        assert!(project.is_finalized(1, TEXT));
        assert!(!project.knowledge().is_empty().await);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(state_responses()));
        let mut project = project(dir.path(), provider.clone());
        project.write_chapter(1, TEXT).unwrap();

        let finalizer = Finalizer::new(runner(provider.clone()));
        finalizer.finalize(&mut project, &FinalizeRequest::new(1, 3000)).await.unwrap();
        let summary = project.global_summary().to_string();
        let entries = project.knowledge().len().await;

        let second = finalizer.finalize(&mut project, &FinalizeRequest::new(1, 3000)).await.unwrap();
        assert!(second.was_noop());
        assert_eq!(second.steps_skipped.len(), 5);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(project.global_summary(), summary);
        assert_eq!(project.knowledge().len().await, entries);
    }

    #[tokio::test]
    async fn force_reruns_without_duplicate_knowledge() {
        let dir = tempfile::tempdir().unwrap();
        let mut responses = state_responses();
        responses.extend(state_responses());
        let provider = Arc::new(ScriptedProvider::new(responses));
        let mut project = project(dir.path(), provider.clone());
        project.write_chapter(1, TEXT).unwrap();

        let finalizer = Finalizer::new(runner(provider.clone()));
        finalizer.finalize(&mut project, &FinalizeRequest::new(1, 3000)).await.unwrap();
        let entries = project.knowledge().len().await;

        let mut request = FinalizeRequest::new(1, 3000);
        request.force = true;
        let outcome = finalizer.finalize(&mut project, &request).await.unwrap();
        assert_eq!(outcome.steps_run.len(), 5);
        assert_eq!(provider.call_count(), 6);
        assert_eq!(project.knowledge().len().await, entries);
    }

    #[tokio::test]
    async fn failure_mid_way_resumes_at_failed_step() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::from_results([
            Ok("summary v1".to_string()),
            Err(ProviderError::Timeout { timeout_secs: 600 }),
        ]));
        let mut project = project(dir.path(), provider.clone());
        project.write_chapter(1, TEXT).unwrap();

        let err = Finalizer::new(runner(provider))
            .finalize(&mut project, &FinalizeRequest::new(1, 3000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Timeout { .. })));
        assert_eq!(project.require_chapter_text(1).unwrap(), TEXT);
        assert!(project.ledger().is_done(1, FinalizeStep::SummaryMerge));
        assert!(!project.ledger().is_done(1, FinalizeStep::CharacterUpdate));
        assert!(project.knowledge().is_empty().await);

        let retry = Arc::new(ScriptedProvider::new(["Mara:\n- Possessions: key", "- [OPEN] key"]));
        let outcome = Finalizer::new(runner(retry.clone()))
            .finalize(&mut project, &FinalizeRequest::new(1, 3000))
            .await
            .unwrap();
        assert_eq!(
            outcome.steps_skipped,
            vec![FinalizeStep::Persist, FinalizeStep::SummaryMerge]
        );
        assert_eq!(retry.call_count(), 2);
        assert_eq!(project.global_summary(), "summary v1");
        assert!(project.is_finalized(1, TEXT));
    }

    #[tokio::test]
    async fn edited_text_restarts_all_steps() {
        let dir = tempfile::tempdir().unwrap();
        let mut responses = state_responses();
        responses.extend(state_responses());
        let provider = Arc::new(ScriptedProvider::new(responses));
        let mut project = project(dir.path(), provider.clone());
        project.write_chapter(1, TEXT).unwrap();

        let finalizer = Finalizer::new(runner(provider.clone()));
        finalizer.finalize(&mut project, &FinalizeRequest::new(1, 3000)).await.unwrap();

        project.write_chapter(1, "Mara lost the key in the river.").unwrap();
        assert!(!project.is_finalized(1, "Mara lost the key in the river."));
        let outcome = finalizer.finalize(&mut project, &FinalizeRequest::new(1, 3000)).await.unwrap();
        assert_eq!(outcome.steps_run.len(), 5);
    }

    #[tokio::test]
    async fn preconditions_fail_without_calls() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));

        let mut no_embedder = project_without_embedder(dir.path());
        no_embedder.write_chapter(1, TEXT).unwrap();
        let err = Finalizer::new(runner(provider.clone()))
            .finalize(&mut no_embedder, &FinalizeRequest::new(1, 3000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let other = tempfile::tempdir().unwrap();
        let mut project = project(other.path(), provider.clone());
        let err = Finalizer::new(runner(provider.clone()))
            .finalize(&mut project, &FinalizeRequest::new(2, 3000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::State(StateError::ChapterMissing(2))));

        project.save_blueprint(blueprint(1)).unwrap();
        let mut request = FinalizeRequest::new(2, 3000);
        request.text = Some(TEXT.into());
        let err = Finalizer::new(runner(provider.clone()))
            .finalize(&mut project, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::State(StateError::ChapterOutOfRange { .. })));

        assert_eq!(provider.call_count(), 0);
        assert!(!dir.path().join(crate::project::LEDGER_FILE).exists());
    }
}
