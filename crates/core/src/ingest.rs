use crate::config::EngineConfig;
use crate::error::IngestError;
use crate::gateway::{normalize_l2, ModelGateway};
use crate::metadata::MetadataExtractor;
use crate::models::{AssetDescriptor, AssetState, IngestedAsset};
use crate::traits::AssetStore;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Terminal result of ingesting one asset along a success path. Quality
/// rejection and duplicate detection are outcomes, not errors.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Persisted(IngestedAsset),
    Duplicate(IngestedAsset),
    Rejected(IngestedAsset),
}

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub asset_url: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub persisted: Vec<IngestedAsset>,
    pub rejected: Vec<IngestedAsset>,
    pub duplicates: usize,
    pub failures: Vec<BatchFailure>,
}

/// Retrieves raw bytes for an asset URL. One attempt per call; the
/// pipeline wraps calls in the retry policy.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError>;
}

pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        let parsed = url::Url::parse(url)
            .map_err(|error| IngestError::InvalidArgument(format!("bad asset url {url}: {error}")))?;
        let response = self.client.get(parsed).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        if !content_type.starts_with("image/") {
            return Err(IngestError::NotAnImage(url.to_string()));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Spaces upstream fetches at a fixed minimum interval, independent of
/// how many workers the pool runs. Crawl etiquette, not throughput.
pub struct FetchThrottle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl FetchThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Drives each raw asset through
/// fetch -> quality gate -> embed -> detect -> metadata -> persist,
/// with dedup before any of it.
pub struct IngestionPipeline<S, G, F> {
    store: S,
    gateway: G,
    fetcher: F,
    config: EngineConfig,
    throttle: FetchThrottle,
    metadata: MetadataExtractor,
    download_dir: Option<PathBuf>,
}

impl<S, G, F> IngestionPipeline<S, G, F>
where
    S: AssetStore + Send + Sync,
    G: ModelGateway,
    F: AssetFetcher,
{
    pub fn new(store: S, gateway: G, fetcher: F, config: EngineConfig) -> Result<Self, IngestError> {
        let metadata = MetadataExtractor::new(3)
            .map_err(|error| IngestError::InvalidArgument(error.to_string()))?;
        let throttle = FetchThrottle::new(Duration::from_millis(config.fetch_min_interval_ms));
        Ok(Self {
            store,
            gateway,
            fetcher,
            config,
            throttle,
            metadata,
            download_dir: None,
        })
    }

    /// Keeps a local copy of each fetched image under this directory.
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = Some(dir);
        self
    }

    /// Ingests a single asset. Duplicate and rejected outcomes are `Ok`;
    /// `Err` means this asset failed, and [`IngestError::halts_batch`]
    /// decides whether the failure also poisons the whole batch.
    pub async fn ingest_one(
        &self,
        descriptor: &AssetDescriptor,
        cancel: &watch::Receiver<bool>,
    ) -> Result<IngestOutcome, IngestError> {
        ensure_active(cancel)?;

        // Dedup before any expensive work: an asset already persisted for
        // this (source, url) pair makes the whole call a no-op.
        let existing = self
            .store
            .find(&descriptor.source, &descriptor.asset_url)
            .await
            .map_err(|error| IngestError::Storage(error.to_string()))?;
        if let Some(existing) = existing {
            if existing.state == AssetState::Persisted {
                debug!(url = %descriptor.asset_url, "duplicate asset, returning existing record");
                return Ok(IngestOutcome::Duplicate(existing));
            }
        }

        let mut asset = IngestedAsset::new(
            &descriptor.source,
            &descriptor.source_id,
            &descriptor.asset_url,
        );
        asset.caption = descriptor.caption.clone();

        let bytes = self.fetch_with_retry(&descriptor.asset_url).await?;
        ensure_active(cancel)?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|error| IngestError::Decode(error.to_string()))?;

        // Quality gate runs before the embedding model ever sees the
        // asset; a rejection here must not cost an inference call.
        let scores = self
            .gateway
            .score_quality(&bytes)
            .await
            .map_err(|error| IngestError::ModelInference(error.to_string()))?;
        let report = self.config.quality.evaluate(
            decoded.width(),
            decoded.height(),
            scores.blur,
            scores.brightness,
            scores.colorfulness,
            scores.nsfw,
        );
        asset.quality = Some(report);
        asset.state = AssetState::QualityChecked;

        if !report.is_acceptable {
            asset.state = AssetState::Rejected;
            self.store
                .upsert(&asset)
                .await
                .map_err(|error| IngestError::Storage(error.to_string()))?;
            info!(url = %asset.asset_url, blur = report.blur_score, nsfw = report.nsfw_score,
                resolution_ok = report.resolution_ok, "asset rejected by quality gate");
            return Ok(IngestOutcome::Rejected(asset));
        }
        asset.state = AssetState::Accepted;
        ensure_active(cancel)?;

        let mut embedding = self
            .gateway
            .embed_image(&bytes)
            .await
            .map_err(|error| IngestError::ModelInference(error.to_string()))?;
        if embedding.len() != self.config.image_dimensions {
            return Err(IngestError::DimensionMismatch {
                expected: self.config.image_dimensions,
                actual: embedding.len(),
            });
        }
        normalize_l2(&mut embedding);
        asset.image_embedding = Some(embedding);
        asset.state = AssetState::Embedded;

        match self.gateway.detect(&bytes).await {
            Ok(detections) => {
                if let Some(primary) = detections
                    .into_iter()
                    .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
                {
                    asset.detected_class = Some(primary.label);
                    asset.bounding_box = Some(primary.bbox);
                }
            }
            Err(error) => {
                return Err(IngestError::ModelInference(error.to_string()));
            }
        }
        ensure_active(cancel)?;

        let metadata = self
            .metadata
            .extract_all(Some(&decoded), asset.caption.as_deref());
        asset.colors = metadata.colors;
        asset.styles = metadata.styles;
        asset.brands = metadata.brands;
        asset.state = AssetState::MetadataExtracted;

        if let Some(dir) = &self.download_dir {
            match save_local_copy(dir, &asset.asset_url, &bytes).await {
                Ok(path) => asset.local_path = Some(path),
                Err(error) => {
                    warn!(url = %asset.asset_url, %error, "failed to keep local copy");
                }
            }
        }

        asset.state = AssetState::Persisted;
        self.store
            .upsert(&asset)
            .await
            .map_err(|error| IngestError::Storage(error.to_string()))?;
        info!(url = %asset.asset_url, class = asset.detected_class.as_deref().unwrap_or("-"),
            "asset persisted");
        Ok(IngestOutcome::Persisted(asset))
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>, IngestError> {
        self.throttle.acquire().await;
        let policy = self.config.retry;
        policy
            .run(|_| self.fetcher.fetch(url), fetch_retryable)
            .await
            .map_err(|error| match error {
                permanent @ (IngestError::NotAnImage(_) | IngestError::InvalidArgument(_)) => {
                    permanent
                }
                error => IngestError::Fetch {
                    url: url.to_string(),
                    attempts: policy.max_attempts,
                    reason: error.to_string(),
                },
            })
    }

    /// Processes a batch on a bounded worker pool. Per-asset failures are
    /// recorded and the batch continues; a configuration-level failure
    /// (dimension drift) aborts the remaining work.
    pub async fn run_batch(
        self: Arc<Self>,
        descriptors: Vec<AssetDescriptor>,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchReport, IngestError>
    where
        S: 'static,
        G: 'static,
        F: 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size.max(1)));
        let mut tasks = JoinSet::new();

        for descriptor in descriptors {
            let pipeline = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            descriptor,
                            Err(IngestError::Cancelled("worker pool closed".to_string())),
                        )
                    }
                };
                let result = pipeline.ingest_one(&descriptor, &cancel).await;
                (descriptor, result)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (descriptor, result) = match joined {
                Ok(output) => output,
                Err(join_error) => {
                    report.failures.push(BatchFailure {
                        asset_url: "<unknown>".to_string(),
                        reason: format!("worker panicked: {join_error}"),
                    });
                    continue;
                }
            };

            match result {
                Ok(IngestOutcome::Persisted(asset)) => report.persisted.push(asset),
                Ok(IngestOutcome::Rejected(asset)) => report.rejected.push(asset),
                Ok(IngestOutcome::Duplicate(_)) => report.duplicates += 1,
                Err(error) if error.halts_batch() => {
                    // Dropping the set aborts the remaining workers.
                    return Err(error);
                }
                Err(error) => {
                    warn!(url = %descriptor.asset_url, %error, "asset failed");
                    report.failures.push(BatchFailure {
                        asset_url: descriptor.asset_url,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            persisted = report.persisted.len(),
            rejected = report.rejected.len(),
            duplicates = report.duplicates,
            failed = report.failures.len(),
            "ingestion batch finished"
        );
        Ok(report)
    }
}

fn ensure_active(cancel: &watch::Receiver<bool>) -> Result<(), IngestError> {
    if *cancel.borrow() {
        Err(IngestError::Cancelled(
            "batch cancellation requested".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Network-shaped errors are worth retrying; everything else is not.
fn fetch_retryable(error: &IngestError) -> bool {
    match error {
        IngestError::Http(error) => {
            error.is_timeout()
                || error.is_connect()
                || error.is_request()
                || error.is_body()
                || error.status().is_some_and(|status| {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                })
        }
        IngestError::Io(_) => true,
        _ => false,
    }
}

async fn save_local_copy(
    dir: &std::path::Path,
    asset_url: &str,
    bytes: &[u8],
) -> Result<String, IngestError> {
    let digest = Sha256::digest(asset_url.as_bytes());
    let name = format!("{:x}", digest);
    let path = dir.join(format!("{}_orig.jpg", &name[..12]));
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&path, bytes).await?;
    Ok(path.to_string_lossy().to_string())
}
