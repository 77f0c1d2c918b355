use crate::config::BoostWeights;
use crate::models::{CatalogItem, RankedItem, ScoredItem};

/// Orders vector-index candidates, lifting ones that also match query
/// keywords lexically.
///
/// The boosts are a fixed heuristic, not a learned ranker: they are not
/// normalized against the candidate set and carry no IDF weighting. That
/// is a known limitation accepted for predictability.
pub struct HybridRanker {
    weights: BoostWeights,
}

impl HybridRanker {
    pub fn new(weights: BoostWeights) -> Self {
        Self { weights }
    }

    /// With no keywords the order is purely similarity, descending. With
    /// keywords, each candidate gains +title / +category / +sub_category
    /// boosts, additively, clamped to [0, 1]. Ties always break on
    /// ascending item id so the order is deterministic.
    pub fn rank(&self, candidates: Vec<ScoredItem>, keywords: &[String]) -> Vec<RankedItem> {
        let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut ranked: Vec<RankedItem> = candidates
            .into_iter()
            .map(|candidate| {
                let score = if lowered.is_empty() {
                    candidate.similarity
                } else {
                    (candidate.similarity + self.boost(&candidate.item, &lowered)).clamp(0.0, 1.0)
                };
                RankedItem {
                    item: candidate.item,
                    score,
                }
            })
            .collect();

        ranked.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.item.item_id.cmp(&right.item.item_id))
        });
        ranked
    }

    fn boost(&self, item: &CatalogItem, keywords: &[String]) -> f64 {
        let mut boost = 0.0;
        let title = item.title.to_lowercase();
        if keywords.iter().any(|keyword| title.contains(keyword)) {
            boost += self.weights.title;
        }
        if matches_field(item.category.as_deref(), keywords) {
            boost += self.weights.category;
        }
        if matches_field(item.sub_category.as_deref(), keywords) {
            boost += self.weights.sub_category;
        }
        boost
    }
}

fn matches_field(field: Option<&str>, keywords: &[String]) -> bool {
    field.is_some_and(|value| {
        let lowered = value.to_lowercase();
        keywords.iter().any(|keyword| lowered.contains(keyword))
    })
}

/// True when the item carries an excluded keyword in a positive field
/// (title, category or sub-category). Used as a final guard after ranking
/// so negated terms never surface, whatever the store returned.
pub fn violates_exclusions<'a>(
    item: &CatalogItem,
    exclude_keywords: impl IntoIterator<Item = &'a String>,
) -> bool {
    let title = item.title.to_lowercase();
    let category = item.category.as_deref().unwrap_or("").to_lowercase();
    let sub_category = item.sub_category.as_deref().unwrap_or("").to_lowercase();
    exclude_keywords.into_iter().any(|keyword| {
        let keyword = keyword.to_lowercase();
        title.contains(&keyword) || category.contains(&keyword) || sub_category.contains(&keyword)
    })
}

#[cfg(test)]
mod tests {
    use super::{violates_exclusions, HybridRanker};
    use crate::config::BoostWeights;
    use crate::models::{CatalogItem, ScoredItem};
    use std::collections::BTreeSet;

    fn item(id: &str, title: &str, category: Option<&str>, sub_category: Option<&str>) -> CatalogItem {
        CatalogItem {
            item_id: id.to_string(),
            title: title.to_string(),
            category: category.map(str::to_string),
            sub_category: sub_category.map(str::to_string),
            brand: None,
            gender: None,
            price: None,
            colors: Vec::new(),
            styles: Vec::new(),
            brand_tags: Vec::new(),
            image_embedding: None,
            text_embedding: None,
            is_active: true,
        }
    }

    fn ranker() -> HybridRanker {
        HybridRanker::new(BoostWeights::default())
    }

    #[test]
    fn without_keywords_order_is_similarity_descending() {
        let candidates = vec![
            ScoredItem {
                item: item("a", "Red Dress", None, None),
                similarity: 0.4,
            },
            ScoredItem {
                item: item("b", "Blue Dress", None, None),
                similarity: 0.9,
            },
        ];
        let ranked = ranker().rank(candidates, &[]);
        assert_eq!(ranked[0].item.item_id, "b");
        assert_eq!(ranked[1].item.item_id, "a");
    }

    #[test]
    fn similarity_ties_break_on_ascending_id() {
        let candidates = vec![
            ScoredItem {
                item: item("z", "Same", None, None),
                similarity: 0.5,
            },
            ScoredItem {
                item: item("a", "Same", None, None),
                similarity: 0.5,
            },
        ];
        let ranked = ranker().rank(candidates, &[]);
        assert_eq!(ranked[0].item.item_id, "a");
    }

    #[test]
    fn title_match_outranks_similar_candidate() {
        let candidates = vec![
            ScoredItem {
                item: item("a", "Plain Flats", Some("shoes"), None),
                similarity: 0.62,
            },
            ScoredItem {
                item: item("b", "Black Sneakers", Some("shoes"), None),
                similarity: 0.60,
            },
        ];
        let ranked = ranker().rank(candidates, &["sneakers".to_string()]);
        assert_eq!(ranked[0].item.item_id, "b");
        // 0.60 + 0.30 title boost, no category/sub-category keyword match.
        assert!((ranked[0].score - 0.90).abs() < 1e-9);
    }

    #[test]
    fn boosts_are_additive_across_fields() {
        let candidates = vec![ScoredItem {
            item: item("a", "Running Shoes", Some("shoes"), Some("shoes")),
            similarity: 0.2,
        }];
        let ranked = ranker().rank(candidates, &["shoes".to_string()]);
        assert!((ranked[0].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn combined_score_is_clamped_to_one() {
        let candidates = vec![ScoredItem {
            item: item("a", "Black Sneakers", Some("sneakers"), Some("sneakers")),
            similarity: 0.95,
        }];
        let ranked = ranker().rank(candidates, &["sneakers".to_string()]);
        assert_eq!(ranked[0].score, 1.0);
    }

    #[test]
    fn unmatched_candidates_keep_raw_similarity_order() {
        let candidates = vec![
            ScoredItem {
                item: item("a", "Alpha", None, None),
                similarity: 0.7,
            },
            ScoredItem {
                item: item("b", "Beta", None, None),
                similarity: 0.3,
            },
        ];
        let ranked = ranker().rank(candidates, &["gamma".to_string()]);
        assert_eq!(ranked[0].item.item_id, "a");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn exclusion_violations_are_detected_in_all_positive_fields() {
        let mut excluded = BTreeSet::new();
        excluded.insert("boots".to_string());
        assert!(violates_exclusions(
            &item("a", "Leather Boots", None, None),
            &excluded
        ));
        assert!(violates_exclusions(
            &item("b", "Footwear", Some("boots"), None),
            &excluded
        ));
        assert!(violates_exclusions(
            &item("c", "Footwear", Some("shoes"), Some("boots")),
            &excluded
        ));
        assert!(!violates_exclusions(
            &item("d", "Black Sneakers", Some("shoes"), None),
            &excluded
        ));
    }
}
