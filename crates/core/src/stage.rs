//! The family of LLM-driven pipeline stages.
//!
//! Every stage follows the same template (build prompt → call provider →
//! validate), so a single runner handles timeouts, logging, and events for
//! all of them. The variant is what shows up in logs and errors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Topic → premise, conflict, world rules, arcs.
    Architecture,
    /// Architecture → numbered chapter entries.
    Blueprint,
    /// Blueprint entry + context → chapter draft.
    Draft,
    /// Short draft → expanded draft.
    Enrichment,
    /// Finalize step: merge chapter events into the global summary.
    SummaryMerge,
    /// Finalize step: update character state.
    CharacterUpdate,
    /// Finalize step: update unresolved plot threads.
    PlotArcs,
    /// Advisory cross-check of a chapter against story state.
    Consistency,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Architecture => "architecture",
            Stage::Blueprint => "blueprint",
            Stage::Draft => "draft",
            Stage::Enrichment => "enrichment",
            Stage::SummaryMerge => "summary_merge",
            Stage::CharacterUpdate => "character_update",
            Stage::PlotArcs => "plot_arcs",
            Stage::Consistency => "consistency",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_serde_name() {
        let json = serde_json::to_string(&Stage::SummaryMerge).unwrap();
        assert_eq!(json, format!("\"{}\"", Stage::SummaryMerge));
    }

    #[test]
    fn display_uses_log_name() {
        assert_eq!(Stage::PlotArcs.to_string(), "plot_arcs");
        assert_eq!(Stage::Consistency.as_str(), "consistency");
    }
}
