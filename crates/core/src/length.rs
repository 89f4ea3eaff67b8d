//! Chapter length metric.
//!
//! One combined unit count for mixed-script text: each ideographic character
//! (Han, kana) counts as one unit, and each word of a whitespace-delimited
//! script counts as one unit. "The hero 英雄 walks" measures 5.

/// Fraction of the target length below which enrichment is offered.
pub const ENRICHMENT_THRESHOLD: f64 = 0.8;

/// Scripts written without spaces between words.
fn is_ideographic(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'   // Hiragana, Katakana
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility Ideographs
        | '\u{20000}'..='\u{2FA1F}')
}

/// Measure `text` in combined length units.
pub fn measure(text: &str) -> usize {
    let mut units = 0;
    let mut in_word = false;

    for c in text.chars() {
        if is_ideographic(c) {
            units += 1;
            in_word = false;
        } else if c.is_alphanumeric() {
            if !in_word {
                units += 1;
                in_word = true;
            }
        } else if in_word && matches!(c, '\'' | '’' | '-') {
            // don't, well-known
        } else {
            in_word = false;
        }
    }

    units
}

/// Minimum acceptable length for a target, i.e. `ceil(target * 0.8)`.
pub fn threshold_for(target: u32) -> usize {
    (f64::from(target) * ENRICHMENT_THRESHOLD).ceil() as usize
}

/// Whether a measured length is under the enrichment threshold for `target`.
pub fn is_below_threshold(measured: usize, target: u32) -> bool {
    measured < threshold_for(target)
}
