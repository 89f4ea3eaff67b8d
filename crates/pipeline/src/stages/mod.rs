//! Generation stages.
//!
//! Every stage renders a prompt from [`crate::prompts`] and sends it through
//! the shared [`StageRunner`]. Stages never retry; all of them are safe to
//! re-invoke after a failure.

pub mod architecture;
pub mod blueprint;
pub mod draft;
pub mod enrichment;
pub mod runner;

pub use architecture::{ArchitectureGenerator, ArchitectureRequest};
pub use blueprint::{BlueprintGenerator, BlueprintOutcome, BlueprintRequest};
pub use draft::{DraftGenerator, DraftOutcome, DraftRequest};
pub use enrichment::{EnrichOutcome, EnrichmentGenerator};
pub use runner::{clean_output, GenerationSettings, StagePrompt, StageRunner};

use storyloom_core::{Result, ValidationError};

pub(crate) fn require_positive(name: &str, value: u32) -> Result<()> {
    if value == 0 {
        return Err(ValidationError::InvalidParameter(format!("{name} must be at least 1")).into());
    }
    Ok(())
}
