use crate::error::SearchError;
use crate::models::{CatalogItem, FilterCondition, FilterPredicate, IngestedAsset, ScoredItem};
use crate::traits::{AssetStore, CatalogStore, VectorIndex};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

/// Catalog collection over Qdrant's HTTP API, with named vectors for the
/// image and text modalities.
pub struct QdrantCatalogIndex {
    client: Client,
    endpoint: String,
    collection: String,
    image_dimensions: usize,
    text_dimensions: usize,
}

impl QdrantCatalogIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        image_dimensions: usize,
        text_dimensions: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            collection: collection.into(),
            image_dimensions,
            text_dimensions,
        }
    }

    /// Creates the collection if missing; if it exists, verifies the
    /// stored vector sizes still match the configured dimensions. Drift
    /// here means the embedding models changed underneath the index, so
    /// it is an error rather than a silent recreate.
    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let url = format!("{}/collections/{}", self.endpoint, self.collection);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            for (name, expected) in [
                ("image", self.image_dimensions),
                ("text", self.text_dimensions),
            ] {
                let pointer = format!("/result/config/params/vectors/{name}/size");
                let actual = parsed.pointer(&pointer).and_then(Value::as_u64);
                if actual != Some(expected as u64) {
                    return Err(SearchError::DimensionMismatch {
                        expected,
                        actual: actual.unwrap_or(0) as usize,
                    });
                }
            }
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(&url)
            .json(&json!({
                "vectors": {
                    "image": { "size": self.image_dimensions, "distance": "Cosine" },
                    "text": { "size": self.text_dimensions, "distance": "Cosine" },
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "catalog collection setup failed with {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Picks the named vector by dimension. Image and text dimensions
    /// differ by construction, so the length of the query vector is
    /// enough to identify the modality.
    fn vector_name(&self, query_vector: &[f32]) -> Result<&'static str, SearchError> {
        if query_vector.len() == self.image_dimensions {
            Ok("image")
        } else if query_vector.len() == self.text_dimensions {
            Ok("text")
        } else {
            Err(SearchError::DimensionMismatch {
                expected: self.image_dimensions,
                actual: query_vector.len(),
            })
        }
    }
}

#[async_trait]
impl CatalogStore for QdrantCatalogIndex {
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<(), SearchError> {
        let points = items
            .iter()
            .map(|item| {
                for (embedding, expected) in [
                    (&item.image_embedding, self.image_dimensions),
                    (&item.text_embedding, self.text_dimensions),
                ] {
                    if let Some(vector) = embedding {
                        if vector.len() != expected {
                            return Err(SearchError::DimensionMismatch {
                                expected,
                                actual: vector.len(),
                            });
                        }
                    }
                }

                let mut vectors = serde_json::Map::new();
                if let Some(vector) = &item.image_embedding {
                    vectors.insert("image".to_string(), json!(vector));
                }
                if let Some(vector) = &item.text_embedding {
                    vectors.insert("text".to_string(), json!(vector));
                }

                Ok(json!({
                    "id": point_uuid(&item.item_id),
                    "vector": Value::Object(vectors),
                    "payload": catalog_payload(item)?,
                }))
            })
            .collect::<Result<Vec<_>, SearchError>>()?;

        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        debug!(count, collection = %self.collection, "catalog items upserted");
        Ok(())
    }

    async fn deactivate_item(&self, item_id: &str) -> Result<(), SearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/payload?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "payload": { "is_active": false },
                "points": [point_uuid(item_id)],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantCatalogIndex {
    async fn search(
        &self,
        query_vector: &[f32],
        predicate: &FilterPredicate,
        k: usize,
    ) -> Result<Vec<ScoredItem>, SearchError> {
        let name = self.vector_name(query_vector)?;
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "vector": { "name": name, "vector": query_vector },
                "limit": k,
                "with_payload": true,
                "filter": predicate_to_filter(predicate),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let similarity = hit
                .pointer("/score")
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            let Some(payload) = hit.pointer("/payload").cloned() else {
                continue;
            };
            let item: CatalogItem = serde_json::from_value(payload)?;
            candidates.push(ScoredItem { item, similarity });
        }
        Ok(candidates)
    }
}

/// Asset collection over Qdrant: one point per (source, asset_url) pair.
/// The point id is derived from the dedup key, so upserting the same pair
/// twice overwrites one point instead of inserting a second — which is
/// what makes concurrent re-ingestion safe.
pub struct QdrantAssetStore {
    client: Client,
    endpoint: String,
    collection: String,
    image_dimensions: usize,
}

impl QdrantAssetStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        image_dimensions: usize,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            collection: collection.into(),
            image_dimensions,
        }
    }

    pub async fn ensure_collection(&self) -> Result<(), SearchError> {
        let url = format!("{}/collections/{}", self.endpoint, self.collection);
        let response = self.client.get(&url).send().await?;

        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            let actual = parsed
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64);
            if actual != Some(self.image_dimensions as u64) {
                return Err(SearchError::DimensionMismatch {
                    expected: self.image_dimensions,
                    actual: actual.unwrap_or(0) as usize,
                });
            }
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(&url)
            .json(&json!({
                "vectors": { "size": self.image_dimensions, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Request(format!(
                "asset collection setup failed with {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AssetStore for QdrantAssetStore {
    async fn find(
        &self,
        source: &str,
        asset_url: &str,
    ) -> Result<Option<IngestedAsset>, SearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/scroll",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "filter": {
                    "must": [
                        { "key": "source", "match": { "value": source } },
                        { "key": "asset_url", "match": { "value": asset_url } },
                    ]
                },
                "limit": 1,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let Some(payload) = parsed.pointer("/result/points/0/payload").cloned() else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(payload)?))
    }

    async fn upsert(&self, asset: &IngestedAsset) -> Result<(), SearchError> {
        if let Some(vector) = &asset.image_embedding {
            if vector.len() != self.image_dimensions {
                return Err(SearchError::DimensionMismatch {
                    expected: self.image_dimensions,
                    actual: vector.len(),
                });
            }
        }

        // Rejected records carry no embedding; a zero vector keeps the
        // point storable without inventing a similarity position.
        let vector = asset
            .image_embedding
            .clone()
            .unwrap_or_else(|| vec![0.0; self.image_dimensions]);

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "points": [{
                    "id": point_uuid(&asset.dedup_key()),
                    "vector": vector,
                    "payload": serde_json::to_value(asset)?,
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }
}

/// Stable point id: the first 16 bytes of sha256 over the seed, rendered
/// as a UUID so the same seed always addresses the same point.
fn point_uuid(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

fn catalog_payload(item: &CatalogItem) -> Result<Value, SearchError> {
    let mut payload = serde_json::to_value(item)?;
    if let Some(map) = payload.as_object_mut() {
        // Embeddings live in the vector slots, not the payload.
        map.remove("image_embedding");
        map.remove("text_embedding");
    }
    Ok(payload)
}

/// Translates the flat conjunction into Qdrant's filter grammar: positive
/// atoms into `must`, negated LIKEs into `must_not` full-text matches.
fn predicate_to_filter(predicate: &FilterPredicate) -> Value {
    let mut must = Vec::new();
    let mut must_not = Vec::new();

    for condition in &predicate.conditions {
        match condition {
            FilterCondition::Equals { field, value } => {
                must.push(json!({ "key": field, "match": { "value": value } }));
            }
            FilterCondition::MinPrice(min) => {
                must.push(json!({ "key": "price", "range": { "gte": min } }));
            }
            FilterCondition::MaxPrice(max) => {
                must.push(json!({ "key": "price", "range": { "lte": max } }));
            }
            FilterCondition::AnyTagOf { field, values } => {
                must.push(json!({ "key": field, "match": { "any": values } }));
            }
            FilterCondition::NotLike { field, pattern } => {
                must_not.push(json!({ "key": field, "match": { "text": pattern } }));
            }
            FilterCondition::Active => {
                must.push(json!({ "key": "is_active", "match": { "value": true } }));
            }
        }
    }

    json!({ "must": must, "must_not": must_not })
}
