//! Similarity scoring primitives.

use std::collections::BTreeMap;

use shotlist_core::defaults;
use shotlist_core::tags::TagOverlap;
use shotlist_core::EmbeddingSpace;

/// Cosine similarity between two vectors.
///
/// Returns 0.0 on dimension mismatch or a zero-norm input rather than
/// failing; a malformed asset embedding should demote the asset, not break
/// the recall.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Relative weight for an embedding space.
pub fn space_weight(space: EmbeddingSpace) -> f32 {
    match space {
        EmbeddingSpace::Transcript => defaults::SPACE_WEIGHT_TRANSCRIPT,
        EmbeddingSpace::Description => defaults::SPACE_WEIGHT_DESCRIPTION,
        EmbeddingSpace::Visual => defaults::SPACE_WEIGHT_VISUAL,
    }
}

/// Vector score: weighted maximum cosine across the asset's embedding
/// spaces, floored at 0 so anti-correlated content never outranks a tag
/// match. Returns the score and the winning space.
pub fn vector_score(
    query: &[f32],
    embeddings: &BTreeMap<EmbeddingSpace, Vec<f32>>,
) -> (f32, Option<EmbeddingSpace>) {
    let mut best = 0.0f32;
    let mut best_space = None;
    for (space, vector) in embeddings {
        let similarity = cosine(query, vector).max(0.0) * space_weight(*space);
        if similarity > best {
            best = similarity;
            best_space = Some(*space);
        }
    }
    (best.clamp(0.0, 1.0), best_space)
}

/// Build the human-readable match reason from the top contributing signals.
pub fn match_reason(
    tag_overlap: &TagOverlap,
    vector: f32,
    vector_space: Option<EmbeddingSpace>,
) -> String {
    let mut parts = Vec::new();

    if !tag_overlap.matched.is_empty() {
        let top: Vec<String> = tag_overlap
            .matched
            .iter()
            .take(3)
            .map(|m| format!("{}: {}", m.category, m.tag))
            .collect();
        parts.push(format!("matched tags {}", top.join(", ")));
    }

    if let Some(space) = vector_space {
        if vector > 0.0 {
            parts.push(format!("semantic similarity {:.2} on {}", vector, space));
        }
    }

    if parts.is_empty() {
        "weak match; no dominant signal".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identity_and_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine(&a, &b).abs() < 1e-6);
        assert!((cosine(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_defensive_cases() {
        assert_eq!(cosine(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine(&[], &[]), 0.0);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_vector_score_weighted_max() {
        let query = vec![1.0, 0.0];
        let mut embeddings = BTreeMap::new();
        // Perfect match in transcript space (weight 0.8), weaker in
        // description space (weight 1.0)
        embeddings.insert(EmbeddingSpace::Transcript, vec![1.0, 0.0]);
        embeddings.insert(EmbeddingSpace::Description, vec![0.6, 0.8]);

        let (score, space) = vector_score(&query, &embeddings);
        // transcript: 1.0 * 0.8 = 0.8; description: 0.6 * 1.0 = 0.6
        assert!((score - 0.8).abs() < 1e-6);
        assert_eq!(space, Some(EmbeddingSpace::Transcript));
    }

    #[test]
    fn test_vector_score_negative_floored() {
        let query = vec![1.0, 0.0];
        let mut embeddings = BTreeMap::new();
        embeddings.insert(EmbeddingSpace::Visual, vec![-1.0, 0.0]);
        let (score, space) = vector_score(&query, &embeddings);
        assert_eq!(score, 0.0);
        assert_eq!(space, None);
    }

    #[test]
    fn test_vector_score_empty_spaces() {
        let (score, space) = vector_score(&[1.0], &BTreeMap::new());
        assert_eq!(score, 0.0);
        assert!(space.is_none());
    }

    #[test]
    fn test_match_reason_combines_signals() {
        use shotlist_core::tags::{TagCategory, TagVector};
        let q = TagVector::new().with(TagCategory::SceneType, "chase", 1.0);
        let overlap = q.overlap(&q);
        let reason = match_reason(&overlap, 0.82, Some(EmbeddingSpace::Description));
        assert!(reason.contains("scene_type: chase"));
        assert!(reason.contains("0.82"));
        assert!(reason.contains("description"));

        let weak = match_reason(&TagOverlap::default(), 0.0, None);
        assert!(!weak.is_empty());
    }
}
