//! # Storyloom Pipeline
//!
//! The generation-and-state pipeline: topic → architecture → chapter
//! blueprint → chapter draft → finalized chapter, plus consistency review.
//!
//! [`ProjectState`] owns every artifact of one novel and is passed into each
//! stage explicitly; mutating stages take `&mut ProjectState`, so two of them
//! can never run concurrently on the same in-process value.
//!
//! ```text
//! Pipeline::from_config ──► StageRunner ──► Provider
//!        │
//!        ├─ architecture ─► Novel_architecture.txt
//!        ├─ blueprint ────► Novel_directory.txt
//!        ├─ draft ────────► ContextAssembler ─► KnowledgeStore
//!        ├─ enrich
//!        ├─ finalize ─────► summary / characters / plot arcs / knowledge
//!        └─ check
//! ```

pub mod consistency;
pub mod context;
pub mod finalizer;
pub mod ledger;
pub mod project;
pub mod prompts;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::path::PathBuf;
use std::sync::Arc;

use storyloom_config::{AppConfig, GenerationConfig};
use storyloom_core::{EventBus, Provider, Result};
use storyloom_knowledge::{FileBackend, KnowledgeStore, STORE_DIR};
use storyloom_providers::{build_embedder, build_llm};
use tracing::debug;

pub use consistency::{ConsistencyChecker, ConsistencyIssue, ConsistencyReport, IssueCategory};
pub use context::{ChapterContext, ContextAssembler, ContextBudget, DropInfo, QueryHints, RecentChapter};
pub use finalizer::{FinalizeOutcome, FinalizeRequest, Finalizer};
pub use ledger::{FinalizeLedger, FinalizeStep};
pub use project::{ArtifactStatus, ProjectState};
pub use stages::{
    ArchitectureGenerator, ArchitectureRequest, BlueprintGenerator, BlueprintOutcome, BlueprintRequest,
    DraftGenerator, DraftOutcome, DraftRequest, EnrichOutcome, EnrichmentGenerator, GenerationSettings,
    StagePrompt, StageRunner,
};

/// Open a project with its on-disk knowledge store.
///
/// The embedding provider is attached when `[embedding]` is usable; without
/// it the store can still be inspected and cleared.
pub fn open_project(config: &AppConfig, root: impl Into<PathBuf>) -> Result<ProjectState> {
    let root = root.into();
    let backend = FileBackend::open(root.join(STORE_DIR))?;
    let mut store = KnowledgeStore::new(Arc::new(backend)).with_chunk_chars(config.retrieval.chunk_chars);
    match build_embedder(config) {
        Ok(embedder) => store = store.with_embedder(embedder.provider, embedder.model),
        Err(e) => debug!(error = %e, "Knowledge store opened without an embedder"),
    }
    ProjectState::open(root, store)
}

/// Every stage, wired to one provider and one event bus.
pub struct Pipeline {
    runner: StageRunner,
    budget: ContextBudget,
    generation: GenerationConfig,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn Provider>, settings: GenerationSettings, budget: ContextBudget, events: Arc<EventBus>) -> Self {
        Self {
            runner: StageRunner::new(provider, settings, events),
            budget,
            generation: GenerationConfig::default(),
        }
    }

    /// Build the LLM backend from config. Fails before any request when the
    /// `[llm]` section is unusable.
    pub fn from_config(config: &AppConfig, events: Arc<EventBus>) -> Result<Self> {
        let backend = build_llm(config)?;
        let settings = GenerationSettings {
            model: backend.model,
            ..GenerationSettings::from_config(&config.llm)
        };
        let mut pipeline = Self::new(
            backend.provider,
            settings,
            ContextBudget::from_config(&config.retrieval),
            events,
        );
        pipeline.generation = config.generation.clone();
        Ok(pipeline)
    }

    pub fn runner(&self) -> &StageRunner {
        &self.runner
    }

    /// Defaults for chapter count, words per chapter, genre, and language.
    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Generate and save the architecture, replacing any previous one.
    pub async fn architecture(&self, project: &mut ProjectState, request: &ArchitectureRequest) -> Result<String> {
        let text = ArchitectureGenerator::new(self.runner.clone()).generate(request).await?;
        let path = project.save_architecture(&text)?;
        self.runner.artifact_saved(path.display().to_string());
        Ok(text)
    }

    pub async fn blueprint(&self, project: &mut ProjectState, request: &BlueprintRequest) -> Result<BlueprintOutcome> {
        BlueprintGenerator::new(self.runner.clone()).generate(project, request).await
    }

    pub async fn draft(&self, project: &mut ProjectState, request: &DraftRequest) -> Result<DraftOutcome> {
        DraftGenerator::new(self.runner.clone(), ContextAssembler::new(self.budget.clone()))
            .generate(project, request)
            .await
    }

    /// Enrich the chapter file in place when it is under the threshold.
    pub async fn enrich(&self, project: &mut ProjectState, chapter: u32, target_words: u32) -> Result<EnrichOutcome> {
        EnrichmentGenerator::new(self.runner.clone())
            .enrich_chapter(project, chapter, target_words, &self.generation.language)
            .await
    }

    pub async fn finalize(&self, project: &mut ProjectState, request: &FinalizeRequest) -> Result<FinalizeOutcome> {
        Finalizer::new(self.runner.clone()).finalize(project, request).await
    }

    /// Enrich the chapter file, then finalize it. Finalize preconditions are
    /// checked before the enrichment call, and the enriched text is on disk
    /// before any state update runs.
    pub async fn finalize_enriched(
        &self,
        project: &mut ProjectState,
        request: &FinalizeRequest,
    ) -> Result<(EnrichOutcome, FinalizeOutcome)> {
        let finalizer = Finalizer::new(self.runner.clone());
        let from_file = FinalizeRequest { text: None, ..request.clone() };
        finalizer.preflight(project, &from_file)?;
        let enriched = self.enrich(project, request.chapter, request.target_words).await?;
        let outcome = finalizer.finalize(project, &from_file).await?;
        Ok((enriched, outcome))
    }

    pub async fn check(&self, project: &ProjectState, chapter: u32) -> Result<ConsistencyReport> {
        ConsistencyChecker::new(self.runner.clone()).check(project, chapter, None).await
    }
}
