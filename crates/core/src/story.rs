//! Story artifacts: the chapter blueprint and individual chapters.
//!
//! The blueprint is persisted as human-editable text, one block per chapter:
//!
//! ```text
//! Chapter 3 - The Gatekeeper
//! Role: confrontation
//! Purpose: force the hero to choose between oath and friend
//! Suspense: high
//! Foreshadowing: the cracked seal
//! Twist: the gatekeeper is the hero's missing mentor
//! Summary: The hero confronts the gatekeeper on the Bridge of Ash.
//! ```
//!
//! Headers also accept `# Chapter 3: Title`, `**Chapter 3 — Title**` and
//! `第3章 - Title`. Unknown `Key: value` lines and continuation lines are
//! folded into the outline so user edits are never lost.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ValidationError;
use crate::length;

/// One numbered entry of the chapter blueprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub number: u32,
    pub title: String,
    /// What the chapter does in the overall structure.
    #[serde(default)]
    pub role: String,
    /// The chapter's goal for its characters.
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub suspense: String,
    #[serde(default)]
    pub foreshadowing: String,
    #[serde(default)]
    pub twist: String,
    /// Free-text outline of events.
    #[serde(default)]
    pub outline: String,
}

impl ChapterEntry {
    pub fn new(number: u32, title: impl Into<String>, outline: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            outline: outline.into(),
            ..Self::default()
        }
    }

    /// Render in the persisted blueprint format.
    pub fn render(&self) -> String {
        let mut out = format!("Chapter {} - {}\n", self.number, self.title);
        for (key, value) in [
            ("Role", &self.role),
            ("Purpose", &self.purpose),
            ("Suspense", &self.suspense),
            ("Foreshadowing", &self.foreshadowing),
            ("Twist", &self.twist),
            ("Summary", &self.outline),
        ] {
            if !value.is_empty() {
                out.push_str(key);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }

    fn set_field(&mut self, key: &str, value: &str) -> bool {
        let slot = match key.to_lowercase().as_str() {
            "role" | "position" => &mut self.role,
            "purpose" | "goal" | "core purpose" => &mut self.purpose,
            "suspense" | "suspense level" => &mut self.suspense,
            "foreshadowing" => &mut self.foreshadowing,
            "twist" | "cognitive twist" => &mut self.twist,
            "summary" | "outline" | "synopsis" => &mut self.outline,
            _ => return false,
        };
        append_line(slot, value);
        true
    }
}

fn append_line(slot: &mut String, value: &str) {
    if value.is_empty() {
        return;
    }
    if !slot.is_empty() {
        slot.push(' ');
    }
    slot.push_str(value);
}

/// The ordered per-chapter outline derived from the architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub entries: Vec<ChapterEntry>,
}

impl Blueprint {
    pub fn new(entries: Vec<ChapterEntry>) -> Self {
        Self { entries }
    }

    /// Parse blueprint text. Text before the first chapter header is ignored.
    pub fn parse(text: &str) -> Self {
        let mut entries: Vec<ChapterEntry> = Vec::new();

        for raw in text.lines() {
            let line = strip_decoration(raw);
            if line.is_empty() {
                continue;
            }

            if let Some((number, title)) = parse_header(line) {
                entries.push(ChapterEntry {
                    number,
                    title,
                    ..ChapterEntry::default()
                });
                continue;
            }

            let Some(current) = entries.last_mut() else {
                continue;
            };

            let consumed = line
                .split_once(':')
                .or_else(|| line.split_once('：'))
                .is_some_and(|(key, value)| current.set_field(key.trim(), value.trim()));
            if !consumed {
                append_line(&mut current.outline, line);
            }
        }

        Self { entries }
    }

    /// Render the whole blueprint in the persisted format.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ChapterEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, number: u32) -> Option<&ChapterEntry> {
        self.entries.iter().find(|e| e.number == number)
    }

    /// Highest chapter number present, 0 when empty.
    pub fn last_number(&self) -> u32 {
        self.entries.iter().map(|e| e.number).max().unwrap_or(0)
    }

    /// Length of the run of entries numbered 1, 2, 3, ... from the start.
    ///
    /// A partially generated blueprint can be resumed after this point.
    pub fn contiguous_prefix(&self) -> u32 {
        let mut expected = 1;
        for entry in &self.entries {
            if entry.number != expected {
                break;
            }
            expected += 1;
        }
        expected - 1
    }

    /// Keep only the first `count` entries.
    pub fn truncate(&mut self, count: u32) {
        self.entries.truncate(count as usize);
    }

    pub fn extend(&mut self, other: Blueprint) {
        self.entries.extend(other.entries);
    }

    /// Check that the entries are exactly `start..=end`, in order, no gaps or duplicates.
    pub fn validate_range(&self, start: u32, end: u32) -> Result<(), ValidationError> {
        let expected = end.saturating_sub(start) + 1;
        let actual = self.entries.len() as u32;

        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.number) {
                return Err(ValidationError::MalformedBlueprint(format!(
                    "chapter {} appears more than once",
                    entry.number
                )));
            }
        }

        if actual != expected {
            return Err(ValidationError::EntryCountMismatch { expected, actual });
        }

        for (offset, entry) in self.entries.iter().enumerate() {
            let want = start + offset as u32;
            if entry.number != want {
                return Err(ValidationError::MalformedBlueprint(format!(
                    "expected chapter {want} at position {}, found chapter {}",
                    offset + 1,
                    entry.number
                )));
            }
            if entry.title.is_empty() && entry.outline.is_empty() {
                return Err(ValidationError::MalformedBlueprint(format!(
                    "chapter {want} has neither a title nor an outline"
                )));
            }
        }

        Ok(())
    }

    /// A complete blueprint covers exactly chapters 1..=n.
    pub fn validate_complete(&self, n: u32) -> Result<(), ValidationError> {
        self.validate_range(1, n)
    }
}

/// Strip markdown bullets, heading marks, and emphasis from a line.
fn strip_decoration(raw: &str) -> &str {
    let mut line = raw.trim();
    line = line.trim_start_matches(['#', '>', '-', '*']).trim();
    line.trim_end_matches('*').trim()
}

/// Recognize `Chapter 3 - Title` / `Chapter 3: Title` / `第3章 Title`.
fn parse_header(line: &str) -> Option<(u32, String)> {
    let rest = if let Some(rest) = line.strip_prefix('第') {
        let (digits, after) = split_digits(rest)?;
        let after = after.strip_prefix('章')?;
        return Some((digits, clean_title(after)));
    } else {
        let lower = line.get(..7)?.to_ascii_lowercase();
        if lower != "chapter" {
            return None;
        }
        line[7..].trim_start()
    };

    let (number, after) = split_digits(rest)?;
    // "Chapter 3 was long" is prose, not a header.
    let after_trimmed = after.trim_start();
    let is_header = after_trimmed.is_empty()
        || after_trimmed.starts_with(['-', ':', '：', '.', '–', '—', '|'])
        || after.len() != after_trimmed.len() && after_trimmed.starts_with(['(', '「', '"', '“']);
    if !is_header {
        return None;
    }
    Some((number, clean_title(after_trimmed)))
}

fn split_digits(s: &str) -> Option<(u32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let number = s[..end].parse().ok()?;
    Some((number, &s[end..]))
}

fn clean_title(s: &str) -> String {
    s.trim()
        .trim_start_matches(['-', ':', '：', '.', '–', '—', '|'])
        .trim()
        .trim_matches(['*', '"', '“', '”', '「', '」'])
        .trim()
        .to_string()
}

/// A chapter as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: u32,
    /// Current text (draft or finalized; user-editable).
    pub text: String,
    /// Whether the finalizer has fully committed this exact text.
    pub finalized: bool,
    /// Target length in combined length units.
    pub target_words: u32,
}

impl Chapter {
    /// Combined length of the chapter text (see [`length::measure`]).
    pub fn measured_length(&self) -> usize {
        length::measure(&self.text)
    }

    /// Whether the text is short enough that enrichment should be offered.
    pub fn needs_enrichment(&self) -> bool {
        length::is_below_threshold(self.measured_length(), self.target_words)
    }
}
