mod qdrant;

pub use qdrant::{QdrantAssetStore, QdrantCatalogIndex};
