//! Consistency check: an advisory, read-only review of one chapter against
//! the long-term state.

use serde::{Deserialize, Serialize};
use storyloom_core::{Result, Stage};

use crate::project::ProjectState;
use crate::prompts::{self, ConsistencyInput};
use crate::stages::StageRunner;

/// The kind of contradiction a review line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    CharacterBehavior,
    ItemContinuity,
    Timeline,
    PlotThread,
    WorldRule,
    Other,
}

impl IssueCategory {
    /// Map a bracketed tag such as `ITEM` or `Character` to a category.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_uppercase();
        if tag.starts_with("CHARACTER") {
            Self::CharacterBehavior
        } else if tag.starts_with("ITEM") || tag.starts_with("POSSESSION") {
            Self::ItemContinuity
        } else if tag.starts_with("TIME") {
            Self::Timeline
        } else if tag.starts_with("PLOT") {
            Self::PlotThread
        } else if tag.starts_with("WORLD") {
            Self::WorldRule
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CharacterBehavior => "character",
            Self::ItemContinuity => "item",
            Self::Timeline => "timeline",
            Self::PlotThread => "plot",
            Self::WorldRule => "world",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    pub category: IssueCategory,
    pub description: String,
}

/// The review. Ephemeral: never written to the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub chapter: u32,
    pub raw: String,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    /// Parse `[TAG] description` lines.
    ///
    /// A report that says `NO ISSUES` is clean. When the model answers in
    /// prose without tags, every non-empty line is kept as an `Other` issue
    /// so nothing it reported is lost.
    pub fn parse(chapter: u32, raw: &str) -> Self {
        let mut issues: Vec<ConsistencyIssue> = raw.lines().filter_map(tagged_issue).collect();
        if issues.is_empty() && !says_no_issues(raw) {
            issues = raw
                .lines()
                .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
                .filter(|line| !line.is_empty())
                .map(|line| ConsistencyIssue {
                    category: IssueCategory::Other,
                    description: line.to_string(),
                })
                .collect();
        }
        Self {
            chapter,
            raw: raw.to_string(),
            issues,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, category: IssueCategory) -> bool {
        self.issues.iter().any(|i| i.category == category)
    }
}

fn tagged_issue(line: &str) -> Option<ConsistencyIssue> {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let rest = line.strip_prefix('[')?;
    let (tag, description) = rest.split_once(']')?;
    let description = description.trim().trim_start_matches([':', '-']).trim();
    if description.is_empty() {
        return None;
    }
    Some(ConsistencyIssue {
        category: IssueCategory::from_tag(tag),
        description: description.to_string(),
    })
}

fn says_no_issues(raw: &str) -> bool {
    raw.trim()
        .trim_start_matches(['*', '"'])
        .to_ascii_uppercase()
        .starts_with("NO ISSUES")
}

pub struct ConsistencyChecker {
    runner: StageRunner,
}

impl ConsistencyChecker {
    pub fn new(runner: StageRunner) -> Self {
        Self { runner }
    }

    /// Review `text` (or the chapter file) against the project's state.
    pub async fn check(&self, project: &ProjectState, chapter: u32, text: Option<&str>) -> Result<ConsistencyReport> {
        let text = match text {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            Some(_) => return Err(storyloom_core::StateError::EmptyChapter(chapter).into()),
            None => project.require_chapter_text(chapter)?,
        };

        let prompt = prompts::consistency(&ConsistencyInput {
            setting: project.architecture().unwrap_or_default(),
            global_summary: project.global_summary(),
            character_state: project.character_state(),
            plot_arcs: project.plot_arcs(),
            chapter,
            text: &text,
        });
        let raw = self.runner.run(Stage::Consistency, Some(chapter), prompt).await?;
        Ok(ConsistencyReport::parse(chapter, &raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{project_without_embedder, runner, ScriptedProvider};
    use std::sync::Arc;
    use storyloom_core::{Error, StateError};

    #[test]
    fn parses_tagged_lines() {
        let report = ConsistencyReport::parse(
            4,
            "Review:\n\
- [ITEM] Mara uses the silver key she lost in chapter 2.\n\
[CHARACTER]: Oren is cheerful despite grieving.\n\
[Timeline] Two days pass in one night.\n\
[SOMETHING] odd\n\
[PLOT]\n",
        );
        assert_eq!(report.issues.len(), 4);
        assert_eq!(report.issues[0].category, IssueCategory::ItemContinuity);
        assert_eq!(report.issues[0].description, "Mara uses the silver key she lost in chapter 2.");
        assert_eq!(report.issues[1].category, IssueCategory::CharacterBehavior);
        assert_eq!(report.issues[2].category, IssueCategory::Timeline);
        assert_eq!(report.issues[3].category, IssueCategory::Other);
        assert!(report.has(IssueCategory::ItemContinuity));
        assert!(!report.has(IssueCategory::WorldRule));
    }

    #[test]
    fn no_issues_is_clean() {
        assert!(ConsistencyReport::parse(1, "NO ISSUES").is_clean());
        assert!(ConsistencyReport::parse(1, "No issues found.").is_clean());
    }

    #[test]
    fn untagged_prose_is_kept_as_issues() {
        let report = ConsistencyReport::parse(
            3,
            "The Hero uses his sword in the duel.\n\nHe lost it in chapter 2.",
        );
        assert!(!report.is_clean());
        assert_eq!(report.issues.len(), 2);
        assert!(report.has(IssueCategory::Other));
        assert_eq!(report.issues[1].description, "He lost it in chapter 2.");
    }

    #[tokio::test]
    async fn flags_possession_contradiction_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_without_embedder(dir.path());
        project.save_character_state("Mara:\n- Possessions: none (lost the silver key)").unwrap();
        project.write_chapter(3, "Mara unlocked the gate with her silver key.").unwrap();
        let before = std::fs::read_to_string(dir.path().join(crate::project::CHARACTER_STATE_FILE)).unwrap();

        let provider = Arc::new(ScriptedProvider::new([
            "[ITEM] Mara uses the silver key, but she lost it earlier.",
        ]));
        let report = ConsistencyChecker::new(runner(provider.clone()))
            .check(&project, 3, None)
            .await
            .unwrap();

        assert!(report.has(IssueCategory::ItemContinuity));
        assert!(provider.user_prompt(0).contains("lost the silver key"));
        let after = std::fs::read_to_string(dir.path().join(crate::project::CHARACTER_STATE_FILE)).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn missing_chapter_fails_without_call() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_without_embedder(dir.path());
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let err = ConsistencyChecker::new(runner(provider.clone()))
            .check(&project, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::State(StateError::ChapterMissing(1))));
        assert_eq!(provider.call_count(), 0);
    }
}
