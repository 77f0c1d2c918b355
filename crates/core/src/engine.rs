use crate::config::EngineConfig;
use crate::error::SearchError;
use crate::filters::FilterBuilder;
use crate::gateway::{normalize_l2, ModelGateway};
use crate::models::{QueryIntent, RankedItem, SearchRequest, SearchResponse};
use crate::query::QueryParser;
use crate::ranking::{violates_exclusions, HybridRanker};
use crate::traits::VectorIndex;
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_LIMIT: usize = 20;

/// Front door for queries: understands the text, merges filters, embeds
/// the query, asks the index and ranks what comes back. Searches are
/// stateless and safe to run concurrently; each one runs under a timeout
/// that surfaces as its own outcome rather than an empty result.
pub struct SearchEngine<V, G> {
    index: V,
    gateway: G,
    parser: QueryParser,
    ranker: HybridRanker,
    config: EngineConfig,
}

impl<V, G> SearchEngine<V, G>
where
    V: VectorIndex + Send + Sync,
    G: ModelGateway,
{
    pub fn new(index: V, gateway: G, config: EngineConfig) -> Result<Self, SearchError> {
        let parser = QueryParser::new()
            .map_err(|error| SearchError::Request(format!("query parser init: {error}")))?;
        let ranker = HybridRanker::new(config.boosts);
        Ok(Self {
            index,
            gateway,
            parser,
            ranker,
            config,
        })
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.search_timeout_ms);
        match tokio::time::timeout(deadline, self.execute(request)).await {
            Ok(result) => result.map(|items| SearchResponse {
                total: items.len(),
                query_time_ms: started.elapsed().as_millis() as u64,
                items,
            }),
            Err(_) => Err(SearchError::Timeout(self.config.search_timeout_ms)),
        }
    }

    async fn execute(&self, request: &SearchRequest) -> Result<Vec<RankedItem>, SearchError> {
        let limit = if request.limit == 0 {
            DEFAULT_LIMIT
        } else {
            request.limit
        };
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let intent = text
            .map(|text| self.parser.parse(text))
            .unwrap_or_else(QueryIntent::default);
        let predicate = FilterBuilder::build(&intent, &request.filters);

        let query_vector = if let Some(image) = &request.image {
            // With both an image and text, the image drives the vector
            // lookup; the text still contributes intent above.
            let vector = self
                .gateway
                .embed_image(image)
                .await
                .map_err(|error| SearchError::Request(format!("image embedding: {error}")))?;
            self.prepare_vector(vector, self.config.image_dimensions)?
        } else if let Some(text) = text {
            let vector = self
                .gateway
                .embed_text(text)
                .await
                .map_err(|error| SearchError::Request(format!("text embedding: {error}")))?;
            self.prepare_vector(vector, self.config.text_dimensions)?
        } else {
            return Err(SearchError::Request(
                "search needs a text query or an image".to_string(),
            ));
        };

        let candidates = self.index.search(&query_vector, &predicate, limit).await?;
        debug!(
            candidates = candidates.len(),
            keywords = intent.keywords.len(),
            "vector index returned"
        );

        let ranked = self.ranker.rank(candidates, &intent.keywords);
        Ok(ranked
            .into_iter()
            .filter(|ranked| !violates_exclusions(&ranked.item, &intent.exclude_keywords))
            .take(limit)
            .collect())
    }

    fn prepare_vector(
        &self,
        mut vector: Vec<f32>,
        expected: usize,
    ) -> Result<Vec<f32>, SearchError> {
        if vector.len() != expected {
            return Err(SearchError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        normalize_l2(&mut vector);
        Ok(vector)
    }
}
