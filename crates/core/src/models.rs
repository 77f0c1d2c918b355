use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Canonical product record. Created by batch import, mutated only by
/// re-embedding or metadata re-extraction, never deleted: retirement is
/// `is_active = false`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub item_id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub brand_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetState {
    Fetched,
    QualityChecked,
    Rejected,
    Accepted,
    Embedded,
    MetadataExtracted,
    Persisted,
    Failed,
}

impl AssetState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssetState::Persisted | AssetState::Rejected | AssetState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityReport {
    pub width: u32,
    pub height: u32,
    pub blur_score: f32,
    pub brightness: f32,
    pub colorfulness: f32,
    pub nsfw_score: f32,
    pub resolution_ok: bool,
    pub is_acceptable: bool,
}

/// A scraped image plus everything derived from it. The pair
/// (source, asset_url) is the dedup key: re-ingesting the same pair is a
/// no-op, never a second row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestedAsset {
    pub source: String,
    pub source_id: String,
    pub asset_url: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub detected_class: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub quality: Option<QualityReport>,
    #[serde(default)]
    pub local_path: Option<String>,
    pub state: AssetState,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub ingested_at: DateTime<Utc>,
}

impl IngestedAsset {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>, asset_url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            asset_url: asset_url.into(),
            caption: None,
            image_embedding: None,
            detected_class: None,
            bounding_box: None,
            colors: Vec::new(),
            styles: Vec::new(),
            brands: Vec::new(),
            quality: None,
            local_path: None,
            state: AssetState::Fetched,
            failure_reason: None,
            ingested_at: Utc::now(),
        }
    }

    pub fn dedup_key(&self) -> String {
        asset_dedup_key(&self.source, &self.asset_url)
    }
}

/// Deterministic identity for an asset, derived from the dedup pair so the
/// same (source, url) always maps to the same stored point.
pub fn asset_dedup_key(source: &str, asset_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(asset_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Raw descriptor handed to the ingestion pipeline, as produced by a
/// scraper: where the image came from and what caption it carried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetDescriptor {
    pub source: String,
    pub source_id: String,
    pub asset_url: String,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Structured reading of one free-text query. Derived deterministically;
/// parsing never fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryIntent {
    pub categories: BTreeSet<String>,
    pub exclude_categories: BTreeSet<String>,
    pub exclude_keywords: BTreeSet<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// First-occurrence order, no duplicates.
    pub keywords: Vec<String>,
}

/// Filters supplied explicitly by the caller alongside (or instead of) the
/// free-text query. A price of exactly zero means "no bound".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExplicitFilters {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
}

/// One atomic condition in a filter predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FilterCondition {
    Equals { field: String, value: String },
    MinPrice(f64),
    MaxPrice(f64),
    /// Array overlap: the item's `field` tag set shares at least one value.
    AnyTagOf { field: String, values: Vec<String> },
    /// Negated substring match, case-insensitive.
    NotLike { field: String, pattern: String },
    Active,
}

/// Canonical merge of parsed intent and explicit filters. A flat
/// conjunction: disjunction between conditions is deliberately not
/// supported, which keeps translation to any store trivial. The only OR
/// lives inside `AnyTagOf`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterPredicate {
    pub conditions: Vec<FilterCondition>,
}

impl FilterPredicate {
    pub fn push(&mut self, condition: FilterCondition) {
        self.conditions.push(condition);
    }

    /// In-process evaluation of the predicate against one item. Store
    /// backends translate the predicate instead; this is the reference
    /// semantics used by in-memory indexes and tests.
    pub fn matches(&self, item: &CatalogItem) -> bool {
        self.conditions.iter().all(|condition| match condition {
            FilterCondition::Equals { field, value } => field_value(item, field)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(value)),
            FilterCondition::MinPrice(min) => item.price.is_some_and(|price| price >= *min),
            FilterCondition::MaxPrice(max) => item.price.is_some_and(|price| price <= *max),
            FilterCondition::AnyTagOf { field, values } => {
                let tags = tag_values(item, field);
                values
                    .iter()
                    .any(|value| tags.iter().any(|tag| tag.eq_ignore_ascii_case(value)))
            }
            FilterCondition::NotLike { field, pattern } => !field_value(item, field)
                .is_some_and(|actual| {
                    actual.to_lowercase().contains(&pattern.to_lowercase())
                }),
            FilterCondition::Active => item.is_active,
        })
    }
}

fn field_value<'a>(item: &'a CatalogItem, field: &str) -> Option<&'a str> {
    match field {
        "title" => Some(item.title.as_str()),
        "category" => item.category.as_deref(),
        "sub_category" => item.sub_category.as_deref(),
        "brand" => item.brand.as_deref(),
        "gender" => item.gender.as_deref(),
        _ => None,
    }
}

fn tag_values<'a>(item: &'a CatalogItem, field: &str) -> &'a [String] {
    match field {
        "colors" => &item.colors,
        "styles" => &item.styles,
        "brand_tags" => &item.brand_tags,
        "category" => std::slice::from_ref(category_slot(item)),
        _ => &[],
    }
}

fn category_slot(item: &CatalogItem) -> &String {
    static EMPTY: String = String::new();
    item.category.as_ref().unwrap_or(&EMPTY)
}

/// A candidate returned by the vector index: similarity is
/// `1 - cosine_distance`, in [0, 1] for unit vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item: CatalogItem,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedItem {
    pub item: CatalogItem,
    pub score: f64,
}

/// One search call: optional text, optional image payload, explicit
/// filters, result limit. When both text and image are present the image
/// drives the vector lookup and the text contributes intent.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
    pub filters: ExplicitFilters,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub items: Vec<RankedItem>,
    pub total: usize,
    pub query_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CatalogItem {
        CatalogItem {
            item_id: "p-1".to_string(),
            title: "Black Leather Boots".to_string(),
            category: Some("shoes".to_string()),
            sub_category: Some("boots".to_string()),
            brand: Some("Acme".to_string()),
            gender: None,
            price: Some(79.0),
            colors: vec!["Black".to_string()],
            styles: Vec::new(),
            brand_tags: Vec::new(),
            image_embedding: None,
            text_embedding: None,
            is_active: true,
        }
    }

    #[test]
    fn dedup_key_is_deterministic() {
        let first = asset_dedup_key("pinterest", "https://i.pinimg.com/a.jpg");
        let second = asset_dedup_key("pinterest", "https://i.pinimg.com/a.jpg");
        assert_eq!(first, second);
        assert_ne!(first, asset_dedup_key("instagram", "https://i.pinimg.com/a.jpg"));
    }

    #[test]
    fn predicate_conjunction_requires_all_conditions() {
        let mut predicate = FilterPredicate::default();
        predicate.push(FilterCondition::Equals {
            field: "category".to_string(),
            value: "shoes".to_string(),
        });
        predicate.push(FilterCondition::MaxPrice(100.0));
        predicate.push(FilterCondition::Active);
        assert!(predicate.matches(&item()));

        predicate.push(FilterCondition::MinPrice(90.0));
        assert!(!predicate.matches(&item()));
    }

    #[test]
    fn not_like_rejects_substring_matches() {
        let mut predicate = FilterPredicate::default();
        predicate.push(FilterCondition::NotLike {
            field: "title".to_string(),
            pattern: "boots".to_string(),
        });
        assert!(!predicate.matches(&item()));

        let mut other = item();
        other.title = "Black Sneakers".to_string();
        assert!(predicate.matches(&other));
    }

    #[test]
    fn any_tag_overlap_is_case_insensitive() {
        let mut predicate = FilterPredicate::default();
        predicate.push(FilterCondition::AnyTagOf {
            field: "colors".to_string(),
            values: vec!["black".to_string(), "red".to_string()],
        });
        assert!(predicate.matches(&item()));
    }

    #[test]
    fn inactive_items_never_match_active_predicates() {
        let mut predicate = FilterPredicate::default();
        predicate.push(FilterCondition::Active);
        let mut retired = item();
        retired.is_active = false;
        assert!(!predicate.matches(&retired));
    }

    #[test]
    fn terminal_states_are_marked() {
        assert!(AssetState::Persisted.is_terminal());
        assert!(AssetState::Rejected.is_terminal());
        assert!(AssetState::Failed.is_terminal());
        assert!(!AssetState::Embedded.is_terminal());
    }
}
