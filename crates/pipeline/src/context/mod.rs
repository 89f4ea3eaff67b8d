//! Chapter context assembly for the draft stage.
//!
//! # Context Layers
//!
//! | Layer | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. Blueprint | Entry N and N+1 | Never trimmed |
//! | 2. Recent chapters | Last M chapter files | Oldest dropped, then cut from its start |
//! | 3. Previous tail | End of chapter N-1 | Fixed excerpt length |
//! | 4. Knowledge | Top-k store hits | Hits from chapter N-1 or N dropped |
//! | 5. Guidance | Author's free text | Never trimmed |

pub mod assembler;
pub mod query;

use serde::{Deserialize, Serialize};
use storyloom_core::ChapterEntry;
use storyloom_knowledge::KnowledgeHit;

pub use assembler::{ContextAssembler, ContextBudget};
pub use query::{synthesize_query, QueryHints};

/// One earlier chapter included in the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentChapter {
    pub number: u32,
    pub text: String,
    /// Only the end of the chapter fit in the budget.
    pub truncated: bool,
}

/// Information about items dropped from a layer during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub chars_dropped: usize,
    pub reason: String,
}

/// Everything the draft stage knows about the chapter it is writing.
#[derive(Debug, Clone)]
pub struct ChapterContext {
    pub entry: ChapterEntry,
    pub next_entry: Option<ChapterEntry>,
    /// Most recent first.
    pub recent_chapters: Vec<RecentChapter>,
    pub previous_tail: Option<String>,
    pub knowledge: Vec<KnowledgeHit>,
    /// The query sent to the knowledge store, if retrieval ran.
    pub retrieval_query: Option<String>,
    pub guidance: String,
    pub drops: Vec<DropInfo>,
}
