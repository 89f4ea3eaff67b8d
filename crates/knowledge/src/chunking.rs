//! Text chunking for the knowledge store.
//!
//! Paragraphs are packed greedily up to the limit; an oversized paragraph is
//! split at sentence ends, and an oversized sentence is hard-split on
//! character boundaries. Limits are counted in chars, not bytes.

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_CHARS: usize = 500;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Sentence terminators for Latin and CJK punctuation.
fn ends_sentence(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '…' | '\n')
}

/// Split one paragraph into sentences, keeping the terminators.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !ends_sentence(c) {
            continue;
        }
        // Keep runs like "?!" or closing quotes with the sentence.
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if ends_sentence(next) || matches!(next, '"' | '\'' | '”' | '’' | '」' | '』' | ')') {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let sentence = paragraph[start..end].trim();
        if !sentence.is_empty() {
            out.push(sentence);
        }
        start = end;
    }

    let rest = paragraph[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// Split on char boundaries into pieces of at most `max` chars.
fn hard_split(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Greedy packer: joins pieces with `sep` while they fit.
struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn push(&mut self, piece: &str, sep: &str) {
        let piece_len = char_len(piece);
        let sep_len = if self.current.is_empty() { 0 } else { char_len(sep) };

        if self.current_len + sep_len + piece_len > self.max {
            self.flush();
            self.current.push_str(piece);
            self.current_len = piece_len;
        } else {
            if sep_len > 0 {
                self.current.push_str(sep);
            }
            self.current.push_str(piece);
            self.current_len += sep_len + piece_len;
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    let normalized = text.replace("\r\n", "\n");
    let mut packer = Packer::new(max);

    for paragraph in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(paragraph) <= max {
            packer.push(paragraph, "\n\n");
            continue;
        }

        // Oversized paragraph: start a fresh chunk and pack its sentences.
        packer.flush();
        for sentence in sentences(paragraph) {
            if char_len(sentence) <= max {
                packer.push(sentence, " ");
            } else {
                for piece in hard_split(sentence, max) {
                    packer.push(&piece, "");
                }
            }
        }
        packer.flush();
    }

    packer.finish()
}
