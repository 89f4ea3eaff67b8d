//! Prompt templates for every stage.
//!
//! Templates are plain `format!` strings so a prompt can be read top to
//! bottom next to the stage that sends it. Each function returns a
//! [`StagePrompt`]; none of them perform I/O.

use storyloom_core::length::ENRICHMENT_THRESHOLD;
use storyloom_core::ChapterEntry;

use crate::context::ChapterContext;
use crate::stages::StagePrompt;

const WRITER_ROLE: &str = "You are a professional novelist and story architect. \
You write vivid, coherent long-form fiction and keep track of every character, \
item, and plot thread across chapters.";

const EDITOR_ROLE: &str = "You are a meticulous continuity editor for long-form fiction. \
You keep concise, factual records and never invent events that are not in the text.";

fn language_line(language: &str) -> String {
    if language.trim().is_empty() {
        String::new()
    } else {
        format!("Write the output in {}.\n", language.trim())
    }
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "(none yet)" } else { text }
}

pub struct ArchitectureInput<'a> {
    pub topic: &'a str,
    pub genre: &'a str,
    pub chapters: u32,
    pub words_per_chapter: u32,
    pub guidance: &'a str,
    pub language: &'a str,
}

pub fn architecture(input: &ArchitectureInput<'_>) -> StagePrompt {
    let guidance = if input.guidance.trim().is_empty() {
        String::new()
    } else {
        format!("Additional guidance from the author:\n{}\n\n", input.guidance.trim())
    };
    let user = format!(
        "Design the architecture of a {genre} novel.\n\n\
Topic: {topic}\n\
Planned length: {chapters} chapters of about {words} words each.\n\n\
{guidance}\
Produce the following sections:\n\
1. Core premise (one paragraph)\n\
2. Core conflict and stakes\n\
3. Main characters: name, goal, flaw, secret, starting relationships\n\
4. World rules: setting, power or magic system, social order, hard constraints\n\
5. Major arcs: a three-act plot outline with turning points\n\n\
{language}",
        genre = input.genre,
        topic = input.topic.trim(),
        chapters = input.chapters,
        words = input.words_per_chapter,
        language = language_line(input.language),
    );
    StagePrompt::new(WRITER_ROLE, user)
}

pub fn blueprint(architecture: &str, total: u32, start: u32, end: u32, previous: &str) -> StagePrompt {
    let continuity = if previous.trim().is_empty() {
        String::new()
    } else {
        format!(
            "Chapters already planned (continue after them, do not repeat them):\n{}\n\n",
            previous.trim()
        )
    };
    let user = format!(
        "Novel architecture:\n{architecture}\n\n\
The novel has {total} chapters in total.\n\
{continuity}\
Write the blueprint entries for chapters {start} to {end}, exactly one entry per chapter, \
in order, with no other chapters. Use exactly this format for every entry:\n\n\
Chapter N - Title\n\
Role: what the chapter does in the overall structure\n\
Purpose: the chapter's goal for its characters\n\
Suspense: low, medium, or high\n\
Foreshadowing: what is planted or paid off\n\
Twist: the surprise or reversal, if any\n\
Summary: one or two sentences of events\n\n\
Separate entries with a blank line. Do not add commentary.",
        architecture = architecture.trim(),
    );
    StagePrompt::new(WRITER_ROLE, user)
}

fn entry_block(entry: &ChapterEntry) -> String {
    entry.render().trim_end().to_string()
}

/// Draft-time constraints chosen by the author.
#[derive(Debug, Clone, Default)]
pub struct DraftConstraints<'a> {
    pub guidance: &'a str,
    pub characters: &'a str,
    pub key_items: &'a str,
    pub location: &'a str,
    pub time_constraint: &'a str,
    pub language: &'a str,
}

pub fn draft(
    context: &ChapterContext,
    target_words: u32,
    constraints: &DraftConstraints<'_>,
    global_summary: &str,
    character_state: &str,
) -> StagePrompt {
    let mut user = format!(
        "Write chapter {n} of the novel, about {target_words} words.\n\n\
Blueprint for this chapter:\n{entry}\n\n",
        n = context.entry.number,
        entry = entry_block(&context.entry),
    );

    if let Some(next) = &context.next_entry {
        user.push_str(&format!(
            "The following chapter will be (set it up, do not write it):\n{}\n\n",
            entry_block(next)
        ));
    }

    user.push_str(&format!("Story so far:\n{}\n\n", or_none(global_summary)));
    user.push_str(&format!("Character state:\n{}\n\n", or_none(character_state)));

    for recent in &context.recent_chapters {
        let marker = if recent.truncated { " (end only)" } else { "" };
        user.push_str(&format!("Chapter {}{marker}:\n{}\n\n", recent.number, recent.text));
    }

    if let Some(tail) = &context.previous_tail {
        user.push_str(&format!(
            "The previous chapter ends with the passage below. Continue seamlessly from it:\n{tail}\n\n"
        ));
    }

    if !context.knowledge.is_empty() {
        user.push_str("Relevant background material:\n");
        for hit in &context.knowledge {
            user.push_str(&format!("- [{}] {}\n", hit.source, hit.text.trim()));
        }
        user.push('\n');
    }

    for (label, value) in [
        ("Characters involved", constraints.characters),
        ("Key items", constraints.key_items),
        ("Location", constraints.location),
        ("Time constraint", constraints.time_constraint),
        ("Author guidance", constraints.guidance),
    ] {
        if !value.trim().is_empty() {
            user.push_str(&format!("{label}: {}\n", value.trim()));
        }
    }

    user.push_str(
        "\nWrite only the chapter text, starting with the first line of prose. \
Keep every character, item, and location consistent with the material above.\n",
    );
    user.push_str(&language_line(constraints.language));
    StagePrompt::new(WRITER_ROLE, user)
}

pub fn enrichment(text: &str, measured: usize, target_words: u32, language: &str) -> StagePrompt {
    let user = format!(
        "The chapter below is {measured} words long; the target is {target_words} words \
(anything under {pct}% of the target is too short).\n\n\
Expand it to roughly {target_words} words. Deepen scenes, dialogue, sensory detail, and \
inner life, but keep every plot event, its order, and its outcome unchanged. \
Do not add new plot events or characters.\n\n\
Chapter:\n{text}\n\n\
Return only the expanded chapter text.\n{language}",
        pct = (ENRICHMENT_THRESHOLD * 100.0).round() as u32,
        text = text.trim(),
        language = language_line(language),
    );
    StagePrompt::new(WRITER_ROLE, user)
}

pub fn summary_merge(previous: &str, chapter: u32, text: &str) -> StagePrompt {
    let user = format!(
        "Current global summary of the novel:\n{previous}\n\n\
New chapter {chapter}:\n{text}\n\n\
Rewrite the global summary so it covers everything up to and including chapter {chapter}. \
Merge the new events into the existing summary instead of appending a chapter recap; \
compress older details where needed. Keep it under 2000 words. \
Return only the updated summary.",
        previous = or_none(previous),
        text = text.trim(),
    );
    StagePrompt::new(EDITOR_ROLE, user)
}

pub fn character_update(previous: &str, chapter: u32, text: &str) -> StagePrompt {
    let user = format!(
        "Current character state document:\n{previous}\n\n\
New chapter {chapter}:\n{text}\n\n\
Update the character state document. For every character who appears or is affected, \
record their current status, location, relationships, and possessions, applying \
the changes from this chapter. Keep entries for characters who do not appear. \
Use one section per character:\n\n\
Name:\n\
- Status: ...\n\
- Location: ...\n\
- Relationships: ...\n\
- Possessions: ...\n\n\
Return only the updated document.",
        previous = or_none(previous),
        text = text.trim(),
    );
    StagePrompt::new(EDITOR_ROLE, user)
}

pub fn plot_arcs(previous: &str, chapter: u32, text: &str) -> StagePrompt {
    let user = format!(
        "Current list of plot threads:\n{previous}\n\n\
New chapter {chapter}:\n{text}\n\n\
Update the list of plot threads. Add threads this chapter opens, mark threads it \
resolves as resolved with the chapter number, and note progress on open threads. \
One thread per line in the form:\n\
- [OPEN] thread description (since chapter N)\n\
- [RESOLVED] thread description (resolved in chapter N)\n\n\
Return only the updated list.",
        previous = or_none(previous),
        text = text.trim(),
    );
    StagePrompt::new(EDITOR_ROLE, user)
}

pub struct ConsistencyInput<'a> {
    pub setting: &'a str,
    pub global_summary: &'a str,
    pub character_state: &'a str,
    pub plot_arcs: &'a str,
    pub chapter: u32,
    pub text: &'a str,
}

pub fn consistency(input: &ConsistencyInput<'_>) -> StagePrompt {
    let user = format!(
        "Novel setting:\n{setting}\n\n\
Global summary:\n{summary}\n\n\
Character state:\n{characters}\n\n\
Plot threads:\n{arcs}\n\n\
Chapter {chapter} to review:\n{text}\n\n\
List every contradiction between the chapter and the material above, one per line, \
each starting with a category tag:\n\
[CHARACTER] behavior or status that contradicts the character state\n\
[ITEM] an item used, held, or lost in a way that contradicts possessions\n\
[TIMELINE] events out of order or impossible timing\n\
[PLOT] a plot thread ignored, contradicted, or resolved twice\n\
[WORLD] a violation of the world rules\n\
[OTHER] anything else\n\n\
If there are no contradictions, answer exactly: NO ISSUES",
        setting = or_none(input.setting),
        summary = or_none(input.global_summary),
        characters = or_none(input.character_state),
        arcs = or_none(input.plot_arcs),
        chapter = input.chapter,
        text = input.text.trim(),
    );
    StagePrompt::new(EDITOR_ROLE, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn architecture_mentions_inputs() {
        let prompt = architecture(&ArchitectureInput {
            topic: "a city that forgets",
            genre: "fantasy",
            chapters: 12,
            words_per_chapter: 3000,
            guidance: "",
            language: "English",
        });
        assert!(prompt.user.contains("a city that forgets"));
        assert!(prompt.user.contains("12 chapters"));
        assert!(prompt.user.contains("Write the output in English."));
        assert!(!prompt.user.contains("Additional guidance"));
    }

    #[test]
    fn blueprint_names_exact_range() {
        let prompt = blueprint("arch", 30, 11, 20, "Chapter 10 - Before");
        assert!(prompt.user.contains("chapters 11 to 20"));
        assert!(prompt.user.contains("Chapter 10 - Before"));
    }

    #[test]
    fn enrichment_states_threshold() {
        let prompt = enrichment("Short.", 1, 3000, "");
        assert!(prompt.user.contains("80%"));
        assert!(prompt.user.contains("Short."));
    }

    #[test]
    fn empty_state_is_marked() {
        let prompt = summary_merge("", 1, "text");
        assert!(prompt.user.contains("(none yet)"));
    }
}
