//! The chapter context assembler.
//!
//! # Determinism
//!
//! Apart from the knowledge query, assembly is a pure function of the
//! project files: identical files always produce identical contexts.

use storyloom_config::RetrievalConfig;
use storyloom_core::Result;
use storyloom_knowledge::SourceTag;
use tracing::{debug, warn};

use super::query::{synthesize_query, QueryHints};
use super::{ChapterContext, DropInfo, RecentChapter};
use crate::project::ProjectState;

/// Size limits for the context layers.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// How many earlier chapters to include.
    pub recent_chapters: usize,
    /// Total characters across included earlier chapters.
    pub recent_chars: usize,
    /// Characters of the previous chapter's ending.
    pub tail_chars: usize,
    /// Knowledge hits to include.
    pub top_k: usize,
}

impl ContextBudget {
    pub fn from_config(retrieval: &RetrievalConfig) -> Self {
        Self {
            recent_chapters: retrieval.recent_chapters,
            recent_chars: retrieval.recent_chapter_budget,
            tail_chars: retrieval.tail_excerpt_chars,
            top_k: retrieval.top_k,
        }
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let total = text.chars().count();
    if total <= n {
        return text;
    }
    let start = text
        .char_indices()
        .nth(total - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

/// The context assembler. Stateless apart from its budget.
pub struct ContextAssembler {
    budget: ContextBudget,
}

impl ContextAssembler {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Assemble the context for drafting `chapter`.
    ///
    /// The blueprint range check runs before any provider call. An empty
    /// knowledge store or a missing embedder yields no hits, not an error.
    pub async fn assemble(
        &self,
        project: &ProjectState,
        chapter: u32,
        hints: &QueryHints<'_>,
        guidance: &str,
    ) -> Result<ChapterContext> {
        let entry = project.require_entry(chapter)?.clone();
        let next_entry = project
            .blueprint()
            .and_then(|bp| bp.entry(chapter + 1))
            .cloned();

        let mut drops = Vec::new();

        let (recent_chapters, recent_drop) = self.recent_layer(project, chapter)?;
        drops.extend(recent_drop);

        let previous_tail = match chapter.checked_sub(1).filter(|n| *n >= 1) {
            Some(prev) => project
                .read_chapter_text(prev)?
                .map(|text| tail_chars(text.trim_end(), self.budget.tail_chars).to_string())
                .filter(|tail| !tail.trim().is_empty()),
            None => None,
        };

        let mut retrieval_query = None;
        let mut knowledge = Vec::new();
        let store = project.knowledge();
        if self.budget.top_k == 0 {
            // Retrieval disabled.
        } else if !store.has_embedder() {
            warn!(chapter, "No embedding provider configured, drafting without retrieval");
            drops.push(DropInfo {
                layer: "knowledge".into(),
                items_dropped: 0,
                chars_dropped: 0,
                reason: "no embedding provider configured".into(),
            });
        } else {
            let query = synthesize_query(&entry, hints);
            if !query.is_empty() {
                let excluded = [SourceTag::chapter(chapter), SourceTag::chapter(chapter.saturating_sub(1))];
                let hits = store.query(&query, self.budget.top_k * 2).await?;
                let fetched = hits.len();
                knowledge = hits
                    .into_iter()
                    .filter(|hit| !excluded.contains(&hit.source))
                    .take(self.budget.top_k)
                    .collect();
                debug!(chapter, query = %query, fetched, kept = knowledge.len(), "Knowledge retrieved");
                retrieval_query = Some(query);
            }
        }

        Ok(ChapterContext {
            entry,
            next_entry,
            recent_chapters,
            previous_tail,
            knowledge,
            retrieval_query,
            guidance: guidance.trim().to_string(),
            drops,
        })
    }

    /// Earlier chapters, most recent first, within the character budget.
    fn recent_layer(
        &self,
        project: &ProjectState,
        chapter: u32,
    ) -> Result<(Vec<RecentChapter>, Option<DropInfo>)> {
        let first = chapter.saturating_sub(self.budget.recent_chapters as u32).max(1);
        let mut candidates = Vec::new();
        for n in (first..chapter).rev() {
            if let Some(text) = project.read_chapter_text(n)? {
                if !text.trim().is_empty() {
                    candidates.push((n, text));
                }
            }
        }

        let mut remaining = self.budget.recent_chars;
        let mut included = Vec::new();
        let mut items_dropped = 0;
        let mut chars_dropped = 0;

        for (number, text) in candidates {
            let len = text.chars().count();
            if len <= remaining {
                remaining -= len;
                included.push(RecentChapter {
                    number,
                    text,
                    truncated: false,
                });
            } else if remaining > 0 {
                chars_dropped += len - remaining;
                included.push(RecentChapter {
                    number,
                    text: tail_chars(&text, remaining).to_string(),
                    truncated: true,
                });
                remaining = 0;
            } else {
                items_dropped += 1;
                chars_dropped += len;
            }
        }

        let drop = (chars_dropped > 0).then(|| DropInfo {
            layer: "recent_chapters".into(),
            items_dropped,
            chars_dropped,
            reason: format!("over the {}-character budget", self.budget.recent_chars),
        });
        if let Some(d) = &drop {
            debug!(chapter, items = d.items_dropped, chars = d.chars_dropped, "Trimmed recent chapters");
        }
        Ok((included, drop))
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(ContextBudget::default())
    }
}
