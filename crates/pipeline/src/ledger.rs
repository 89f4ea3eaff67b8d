//! Finalize ledger: which finalize steps have completed for which text.
//!
//! Stored as `finalize_log.json` in the project root. Each chapter record
//! carries the SHA-256 of the committed text; a record only counts for the
//! exact text it was written for.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use storyloom_core::persist::{read_optional, write_atomic};
use storyloom_core::{Error, Result};

/// The five finalize steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStep {
    Persist,
    SummaryMerge,
    CharacterUpdate,
    PlotArcs,
    Knowledge,
}

impl FinalizeStep {
    pub const ALL: [FinalizeStep; 5] = [
        FinalizeStep::Persist,
        FinalizeStep::SummaryMerge,
        FinalizeStep::CharacterUpdate,
        FinalizeStep::PlotArcs,
        FinalizeStep::Knowledge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeStep::Persist => "persist",
            FinalizeStep::SummaryMerge => "summary_merge",
            FinalizeStep::CharacterUpdate => "character_update",
            FinalizeStep::PlotArcs => "plot_arcs",
            FinalizeStep::Knowledge => "knowledge",
        }
    }
}

impl std::fmt::Display for FinalizeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex SHA-256 of chapter text.
pub fn content_hash(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub hash: String,
    pub steps: BTreeSet<FinalizeStep>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalizeLedger {
    #[serde(default)]
    chapters: BTreeMap<u32, LedgerRecord>,
}

impl FinalizeLedger {
    pub fn load(path: &Path) -> Result<Self> {
        match read_optional(path)? {
            None => Ok(Self::default()),
            Some(content) if content.trim().is_empty() => Ok(Self::default()),
            Some(content) => serde_json::from_str(&content)
                .map_err(|e| Error::storage(path, format!("corrupted finalize ledger: {e}"))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &serde_json::to_string_pretty(self)?)
    }

    pub fn record(&self, chapter: u32) -> Option<&LedgerRecord> {
        self.chapters.get(&chapter)
    }

    /// Start (or resume) finalizing `chapter` with text hashing to `hash`.
    ///
    /// A record for different text, or `force`, is reset to no completed steps.
    /// Returns true when an existing record is being resumed.
    pub fn begin(&mut self, chapter: u32, hash: &str, force: bool) -> bool {
        let resumable = !force && self.chapters.get(&chapter).is_some_and(|r| r.hash == hash);
        if !resumable {
            self.chapters.insert(
                chapter,
                LedgerRecord {
                    hash: hash.to_string(),
                    steps: BTreeSet::new(),
                    updated_at: Utc::now(),
                },
            );
        }
        resumable
    }

    pub fn is_done(&self, chapter: u32, step: FinalizeStep) -> bool {
        self.chapters
            .get(&chapter)
            .is_some_and(|r| r.steps.contains(&step))
    }

    pub fn mark_done(&mut self, chapter: u32, step: FinalizeStep) {
        if let Some(record) = self.chapters.get_mut(&chapter) {
            record.steps.insert(step);
            record.updated_at = Utc::now();
        }
    }

    /// Every step completed for exactly this text.
    pub fn is_complete(&self, chapter: u32, hash: &str) -> bool {
        self.chapters.get(&chapter).is_some_and(|r| {
            r.hash == hash && FinalizeStep::ALL.iter().all(|s| r.steps.contains(s))
        })
    }
}
