//! Vector similarity utilities.

use std::cmp::Ordering;

use crate::store::{KnowledgeEntry, KnowledgeHit};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank entries by cosine similarity to `query`, best first.
///
/// Equal scores keep insertion order: the entry with the lower sequence
/// number wins.
pub fn rank(entries: &[KnowledgeEntry], query: &[f32], k: usize) -> Vec<KnowledgeHit> {
    let mut scored: Vec<(f32, &KnowledgeEntry)> = entries
        .iter()
        .map(|entry| (cosine_similarity(&entry.embedding, query), entry))
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.seq.cmp(&b.1.seq))
    });
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, entry)| KnowledgeHit {
            text: entry.text.clone(),
            source: entry.source.clone(),
            score,
            seq: entry.seq,
        })
        .collect()
}
