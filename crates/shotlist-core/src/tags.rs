//! Typed tag categories and per-category weighted tag vectors.
//!
//! Replaces free-form tag dictionaries with a typed category enum plus a
//! weight map. Known categories are first-class variants; `Custom` keeps the
//! model open to new categories without losing typing elsewhere.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A semantic tag category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TagCategory {
    SceneType,
    TimeOfDay,
    Emotion,
    Action,
    ShotType,
    Setting,
    Style,
    /// Open extension point for categories not known at compile time.
    Custom(String),
}

/// Built-in category names, in canonical order.
static BUILTIN_CATEGORIES: Lazy<Vec<TagCategory>> = Lazy::new(|| {
    vec![
        TagCategory::SceneType,
        TagCategory::TimeOfDay,
        TagCategory::Emotion,
        TagCategory::Action,
        TagCategory::ShotType,
        TagCategory::Setting,
        TagCategory::Style,
    ]
});

impl TagCategory {
    /// All built-in categories in canonical order.
    pub fn builtin() -> &'static [TagCategory] {
        &BUILTIN_CATEGORIES
    }

    /// Whether this is a built-in (non-custom) category.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, TagCategory::Custom(_))
    }

    /// Canonical snake_case name.
    pub fn as_str(&self) -> &str {
        match self {
            TagCategory::SceneType => "scene_type",
            TagCategory::TimeOfDay => "time_of_day",
            TagCategory::Emotion => "emotion",
            TagCategory::Action => "action",
            TagCategory::ShotType => "shot_type",
            TagCategory::Setting => "setting",
            TagCategory::Style => "style",
            TagCategory::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for TagCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<TagCategory> for String {
    fn from(c: TagCategory) -> Self {
        c.as_str().to_string()
    }
}

impl From<String> for TagCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "scene_type" => TagCategory::SceneType,
            "time_of_day" => TagCategory::TimeOfDay,
            "emotion" => TagCategory::Emotion,
            "action" => TagCategory::Action,
            "shot_type" => TagCategory::ShotType,
            "setting" => TagCategory::Setting,
            "style" => TagCategory::Style,
            _ => TagCategory::Custom(s),
        }
    }
}

impl std::str::FromStr for TagCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(TagCategory::from(s.to_string()))
    }
}

/// A matched tag reported back from overlap scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedTag {
    pub category: TagCategory,
    pub tag: String,
    /// Contribution of this tag to the overlap score.
    pub weight: f32,
}

/// Result of comparing two tag vectors.
#[derive(Debug, Clone, Default)]
pub struct TagOverlap {
    /// Normalized overlap score in [0, 1].
    pub score: f32,
    /// Matching tags ordered by descending contribution.
    pub matched: Vec<MatchedTag>,
}

/// Per-category weighted tag vector.
///
/// Weights are clamped to [0, 1] on insertion. Backed by ordered maps so
/// iteration (and therefore scoring and match reporting) is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagVector {
    categories: BTreeMap<TagCategory, BTreeMap<String, f32>>,
}

impl TagVector {
    /// Create an empty tag vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a tag weight. The weight is clamped to [0, 1]; the tag is
    /// lowercased and trimmed.
    pub fn set(&mut self, category: TagCategory, tag: impl AsRef<str>, weight: f32) {
        let tag = tag.as_ref().trim().to_lowercase();
        if tag.is_empty() {
            return;
        }
        self.categories
            .entry(category)
            .or_default()
            .insert(tag, weight.clamp(0.0, 1.0));
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, category: TagCategory, tag: impl AsRef<str>, weight: f32) -> Self {
        self.set(category, tag, weight);
        self
    }

    /// Get a tag weight, if present.
    pub fn weight(&self, category: &TagCategory, tag: &str) -> Option<f32> {
        self.categories
            .get(category)
            .and_then(|tags| tags.get(&tag.trim().to_lowercase()))
            .copied()
    }

    /// Whether the vector contains no tags.
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|tags| tags.is_empty())
    }

    /// Number of tags across all categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(|tags| tags.len()).sum()
    }

    /// Iterate all (category, tag, weight) entries in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&TagCategory, &str, f32)> {
        self.categories.iter().flat_map(|(cat, tags)| {
            tags.iter().map(move |(tag, w)| (cat, tag.as_str(), *w))
        })
    }

    /// Tags present in one category.
    pub fn tags_in(&self, category: &TagCategory) -> Vec<(&str, f32)> {
        self.categories
            .get(category)
            .map(|tags| tags.iter().map(|(t, w)| (t.as_str(), *w)).collect())
            .unwrap_or_default()
    }

    /// Merge another vector into this one, keeping the higher weight on
    /// conflicts. Used when ingestion stages contribute tags incrementally.
    pub fn merge(&mut self, other: &TagVector) {
        for (cat, tag, w) in other.iter() {
            let entry = self
                .categories
                .entry(cat.clone())
                .or_default()
                .entry(tag.to_string())
                .or_insert(0.0);
            if w > *entry {
                *entry = w;
            }
        }
    }

    /// Normalized weighted overlap between `self` (the query vector) and an
    /// asset's tag vector.
    ///
    /// Each query tag contributes `query_weight * asset_weight` when the
    /// asset carries the same tag in the same category; the sum is normalized
    /// by the total query weight so the score lands in [0, 1]. An empty query
    /// vector scores 0 against everything.
    pub fn overlap(&self, asset: &TagVector) -> TagOverlap {
        let total_query_weight: f32 = self.iter().map(|(_, _, w)| w).sum();
        if total_query_weight <= 0.0 {
            return TagOverlap::default();
        }

        let mut matched = Vec::new();
        let mut matched_weight = 0.0f32;

        for (cat, tag, qw) in self.iter() {
            if let Some(aw) = asset.weight(cat, tag) {
                let contribution = qw * aw;
                matched_weight += contribution;
                matched.push(MatchedTag {
                    category: cat.clone(),
                    tag: tag.to_string(),
                    weight: contribution,
                });
            }
        }

        matched.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        TagOverlap {
            score: (matched_weight / total_query_weight).clamp(0.0, 1.0),
            matched,
        }
    }

    /// Flatten to a single descriptive string, used as embedding input for
    /// the tag/description space.
    pub fn to_prompt(&self) -> String {
        let mut parts = Vec::new();
        for (cat, tag, _) in self.iter() {
            parts.push(format!("{}: {}", cat, tag));
        }
        parts.join(", ")
    }
}
