use std::cmp::Ordering;
use std::collections::HashSet;

/// Cosine similarity between two embedding vectors.
///
/// Vectors of different length, empty vectors and zero-magnitude vectors
/// all score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Word-overlap similarity (intersection over union of lower-cased tokens)
pub fn jaccard_similarity(a: &str, b: &str) -> f32 {
    let left = token_set(a);
    let right = token_set(b);

    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();

    intersection as f32 / union as f32
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Sort candidates by descending score and keep the best `limit`.
///
/// The sort is stable: candidates with equal scores keep their input order.
pub fn rank<T>(mut scored: Vec<(T, f32)>, limit: usize) -> Vec<(T, f32)> {
    if limit == 0 {
        return Vec::new();
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored
}
