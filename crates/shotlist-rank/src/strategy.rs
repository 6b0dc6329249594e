//! Ranking strategy selection.

use serde::{Deserialize, Serialize};

/// How a recall scores assets against the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankStrategy {
    /// Normalized weighted overlap between query tags and asset tags.
    /// Embeddings are never consulted.
    TagOnly,
    /// Cosine similarity between the query text embedding and each of the
    /// asset's embedding spaces, aggregated by weighted maximum.
    VectorOnly,
    /// `fuzziness · vectorScore + (1 − fuzziness) · tagScore`. Degenerates
    /// exactly to TagOnly at fuzziness 0 and VectorOnly at fuzziness 1.
    #[default]
    Hybrid,
    /// Assets below the hard minimum tag overlap are excluded outright;
    /// survivors are ranked by their VectorOnly score.
    FilterThenRank,
}

impl RankStrategy {
    /// Whether this strategy consults embeddings at all. Hybrid at
    /// fuzziness 0 still skips embedding the query.
    pub fn uses_vectors(&self, fuzziness: f32) -> bool {
        match self {
            Self::TagOnly => false,
            Self::VectorOnly | Self::FilterThenRank => true,
            Self::Hybrid => fuzziness > 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TagOnly => "TAG_ONLY",
            Self::VectorOnly => "VECTOR_ONLY",
            Self::Hybrid => "HYBRID",
            Self::FilterThenRank => "FILTER_THEN_RANK",
        }
    }
}

impl std::fmt::Display for RankStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RankStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TAG_ONLY" => Ok(Self::TagOnly),
            "VECTOR_ONLY" => Ok(Self::VectorOnly),
            "HYBRID" => Ok(Self::Hybrid),
            "FILTER_THEN_RANK" => Ok(Self::FilterThenRank),
            _ => Err(format!("Invalid ranking strategy: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_screaming_snake() {
        let json = serde_json::to_string(&RankStrategy::FilterThenRank).unwrap();
        assert_eq!(json, "\"FILTER_THEN_RANK\"");
        let back: RankStrategy = serde_json::from_str("\"TAG_ONLY\"").unwrap();
        assert_eq!(back, RankStrategy::TagOnly);
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!(
            "hybrid".parse::<RankStrategy>().unwrap(),
            RankStrategy::Hybrid
        );
        assert!("NEAREST".parse::<RankStrategy>().is_err());
    }

    #[test]
    fn test_uses_vectors() {
        assert!(!RankStrategy::TagOnly.uses_vectors(1.0));
        assert!(RankStrategy::VectorOnly.uses_vectors(0.0));
        assert!(RankStrategy::FilterThenRank.uses_vectors(0.0));
        assert!(!RankStrategy::Hybrid.uses_vectors(0.0));
        assert!(RankStrategy::Hybrid.uses_vectors(0.4));
    }
}
