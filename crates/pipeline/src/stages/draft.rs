//! Draft stage: write one chapter from its blueprint entry and context.

use std::path::PathBuf;

use storyloom_core::{length, Result, Stage};
use storyloom_knowledge::KnowledgeHit;

use super::{require_positive, StageRunner};
use crate::context::{ContextAssembler, DropInfo, QueryHints};
use crate::project::ProjectState;
use crate::prompts::{self, DraftConstraints};

#[derive(Debug, Clone, Default)]
pub struct DraftRequest {
    pub chapter: u32,
    pub target_words: u32,
    pub guidance: String,
    pub characters: String,
    pub key_items: String,
    pub location: String,
    pub time_constraint: String,
    pub language: String,
}

impl DraftRequest {
    pub fn new(chapter: u32, target_words: u32) -> Self {
        Self {
            chapter,
            target_words,
            ..Self::default()
        }
    }

    fn hints(&self) -> QueryHints<'_> {
        QueryHints {
            characters: &self.characters,
            key_items: &self.key_items,
            location: &self.location,
            time_constraint: &self.time_constraint,
        }
    }

    fn constraints(&self) -> DraftConstraints<'_> {
        DraftConstraints {
            guidance: &self.guidance,
            characters: &self.characters,
            key_items: &self.key_items,
            location: &self.location,
            time_constraint: &self.time_constraint,
            language: &self.language,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub chapter: u32,
    pub text: String,
    pub path: PathBuf,
    pub hits: Vec<KnowledgeHit>,
    pub drops: Vec<DropInfo>,
    pub measured_length: usize,
    pub below_threshold: bool,
}

pub struct DraftGenerator {
    runner: StageRunner,
    assembler: ContextAssembler,
}

impl DraftGenerator {
    pub fn new(runner: StageRunner, assembler: ContextAssembler) -> Self {
        Self { runner, assembler }
    }

    /// Draft the chapter and save it as the chapter file. Length is reported, not enforced.
    pub async fn generate(&self, project: &mut ProjectState, request: &DraftRequest) -> Result<DraftOutcome> {
        require_positive("target words", request.target_words)?;

        let context = self
            .assembler
            .assemble(project, request.chapter, &request.hints(), &request.guidance)
            .await?;

        let prompt = prompts::draft(
            &context,
            request.target_words,
            &request.constraints(),
            project.global_summary(),
            project.character_state(),
        );
        let text = self.runner.run(Stage::Draft, Some(request.chapter), prompt).await?;

        let path = project.write_chapter(request.chapter, &text)?;
        self.runner.artifact_saved(path.display().to_string());

        let measured_length = length::measure(&text);
        Ok(DraftOutcome {
            chapter: request.chapter,
            below_threshold: length::is_below_threshold(measured_length, request.target_words),
            measured_length,
            text,
            path,
            hits: context.knowledge,
            drops: context.drops,
        })
    }
}
