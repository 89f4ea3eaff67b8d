//! Blueprint stage: expand the architecture into N numbered chapter entries.
//!
//! Large blueprints are generated in batches sized from the model's output
//! budget. The blueprint is saved after every batch, so an interrupted run
//! resumes after the last complete entry instead of starting over.

use storyloom_core::{Blueprint, Result, Stage, ValidationError};
use tracing::info;

use super::{require_positive, StageRunner};
use crate::project::ProjectState;
use crate::prompts;

/// Rough output tokens needed per blueprint entry.
const TOKENS_PER_ENTRY: u32 = 200;

/// Earlier entries shown to each batch for continuity.
const CONTINUITY_WINDOW: usize = 20;

#[derive(Debug, Clone)]
pub struct BlueprintRequest {
    pub total: u32,
    /// Discard any saved blueprint instead of resuming it.
    pub fresh: bool,
}

#[derive(Debug, Clone)]
pub struct BlueprintOutcome {
    pub blueprint: Blueprint,
    /// Entries kept from a previous run.
    pub resumed: u32,
    /// Entries generated by this run.
    pub generated: u32,
    pub batches: u32,
}

pub struct BlueprintGenerator {
    runner: StageRunner,
}

impl BlueprintGenerator {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    fn batch_size(&self, total: u32) -> u32 {
        (self.runner.settings().max_tokens / TOKENS_PER_ENTRY).clamp(1, total)
    }

    pub async fn generate(&self, project: &mut ProjectState, request: &BlueprintRequest) -> Result<BlueprintOutcome> {
        let total = request.total;
        require_positive("chapter count", total)?;
        let architecture = project.require_architecture()?.to_string();

        let mut blueprint = match project.blueprint() {
            Some(existing) if !request.fresh => {
                let mut kept = existing.clone();
                kept.truncate(existing.contiguous_prefix());
                kept
            }
            _ => Blueprint::default(),
        };
        let resumed = blueprint.contiguous_prefix();

        if resumed > total {
            self.runner.events().notice(format!(
                "Saved blueprint has {resumed} chapters but {total} were requested; use --fresh to regenerate"
            ));
            return Err(ValidationError::EntryCountMismatch {
                expected: total,
                actual: resumed,
            }
            .into());
        }
        if resumed == total {
            self.runner
                .events()
                .notice(format!("Blueprint already covers {resumed} chapters"));
            return Ok(BlueprintOutcome {
                blueprint,
                resumed,
                generated: 0,
                batches: 0,
            });
        }
        if resumed > 0 {
            self.runner
                .events()
                .notice(format!("Resuming blueprint after chapter {resumed}"));
        }

        let size = self.batch_size(total);
        let mut start = resumed + 1;
        let mut batches = 0;

        while start <= total {
            let end = (start + size - 1).min(total);
            let window = blueprint.entries.len().saturating_sub(CONTINUITY_WINDOW);
            let previous = Blueprint::new(blueprint.entries[window..].to_vec()).render();

            let prompt = prompts::blueprint(&architecture, total, start, end, &previous);
            let text = self.runner.run(Stage::Blueprint, None, prompt).await?;

            let batch = Blueprint::parse(&text);
            batch.validate_range(start, end)?;
            blueprint.extend(batch);

            let path = project.save_blueprint(blueprint.clone())?;
            self.runner.artifact_saved(format!("{} (chapters 1..={end})", path.display()));
            info!(start, end, total, "Blueprint batch saved");

            batches += 1;
            start = end + 1;
        }

        blueprint.validate_complete(total)?;
        Ok(BlueprintOutcome {
            blueprint,
            resumed,
            generated: total - resumed,
            batches,
        })
    }
}
