//! Retrieval query synthesis.
//!
//! The knowledge store is queried with salient entities, not with the
//! blueprint text itself: a whole outline embeds close to every chunk that
//! shares its style and retrieves noise.

use storyloom_core::ChapterEntry;

/// Author-provided entities that should steer retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryHints<'a> {
    pub characters: &'a str,
    pub key_items: &'a str,
    pub location: &'a str,
    pub time_constraint: &'a str,
}

const STOPWORDS: &[&str] = &[
    "A", "After", "All", "An", "And", "As", "At", "Before", "But", "By", "Chapter", "Every",
    "Finally", "For", "From", "He", "Her", "Here", "His", "I", "If", "In", "It", "Its", "Later",
    "Meanwhile", "No", "Not", "Now", "Of", "On", "Once", "Or", "She", "So", "Some", "That", "The",
    "Their", "Then", "There", "These", "They", "This", "Those", "To", "Until", "We", "When",
    "While", "With", "Without", "Yet", "You",
];

/// Capitalized words that look like names, in order of first appearance.
fn capitalized_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for word in text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’')) {
        let word = word.trim_end_matches(['\'', '’']).trim_end_matches("'s").trim_end_matches("’s");
        let mut chars = word.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        if !first.is_uppercase() || word.chars().count() < 2 || STOPWORDS.contains(&word) {
            continue;
        }
        if !names.iter().any(|n| n == word) {
            names.push(word.to_string());
        }
    }
    names
}

/// Build the retrieval query for a chapter.
///
/// Author hints come first, then names found in the entry's title and
/// outline. Falls back to the title when nothing salient is found.
pub fn synthesize_query(entry: &ChapterEntry, hints: &QueryHints<'_>) -> String {
    let mut parts: Vec<String> = [hints.characters, hints.key_items, hints.location, hints.time_constraint]
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let source = format!("{} {}", entry.title, entry.outline);
    for name in capitalized_names(&source) {
        if !parts.iter().any(|p| p.contains(&name)) {
            parts.push(name);
        }
    }

    if parts.is_empty() {
        return entry.title.trim().to_string();
    }
    parts.join(", ")
}
