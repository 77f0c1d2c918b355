pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod gateway;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod query;
pub mod ranking;
pub mod retry;
pub mod stores;
pub mod traits;

pub use config::{
    BoostWeights, EngineConfig, QualityThresholds, IMAGE_EMBEDDING_DIMENSIONS,
    TEXT_EMBEDDING_DIMENSIONS,
};
pub use engine::SearchEngine;
pub use error::{IngestError, ModelError, SearchError};
pub use filters::FilterBuilder;
pub use gateway::{Detection, HttpModelGateway, ModelGateway, QualityScores};
pub use ingest::{
    AssetFetcher, BatchFailure, BatchReport, FetchThrottle, HttpAssetFetcher, IngestOutcome,
    IngestionPipeline,
};
pub use metadata::{ExtractedMetadata, MetadataExtractor};
pub use models::{
    AssetDescriptor, AssetState, BoundingBox, CatalogItem, ExplicitFilters, FilterCondition,
    FilterPredicate, IngestedAsset, QualityReport, QueryIntent, RankedItem, ScoredItem,
    SearchRequest, SearchResponse,
};
pub use query::QueryParser;
pub use ranking::HybridRanker;
pub use retry::RetryPolicy;
pub use stores::{QdrantAssetStore, QdrantCatalogIndex};
pub use traits::{AssetStore, CatalogStore, VectorIndex};
