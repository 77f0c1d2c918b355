use crate::error::SearchError;
use crate::models::{CatalogItem, FilterPredicate, IngestedAsset, ScoredItem};
use async_trait::async_trait;

/// Nearest-neighbor lookup over catalog embeddings under a predicate.
/// Similarity on returned candidates is `1 - cosine_distance`.
#[async_trait]
pub trait VectorIndex {
    async fn search(
        &self,
        query_vector: &[f32],
        predicate: &FilterPredicate,
        k: usize,
    ) -> Result<Vec<ScoredItem>, SearchError>;
}

/// Write side of the catalog. Items are never deleted, only deactivated.
#[async_trait]
pub trait CatalogStore {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<(), SearchError>;

    async fn deactivate_item(&self, item_id: &str) -> Result<(), SearchError>;
}

/// Persistence for ingested assets. `upsert` must be atomic on the
/// (source, asset_url) pair: two concurrent upserts of the same pair end
/// as one record, which is what makes ingestion idempotent under a
/// concurrent worker pool.
#[async_trait]
pub trait AssetStore {
    async fn find(&self, source: &str, asset_url: &str)
        -> Result<Option<IngestedAsset>, SearchError>;

    async fn upsert(&self, asset: &IngestedAsset) -> Result<(), SearchError>;
}
