use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vibe_search_core::gateway::normalize_l2;
use vibe_search_core::{
    AssetDescriptor, CatalogItem, CatalogStore, EngineConfig, ExplicitFilters, HttpAssetFetcher,
    HttpModelGateway, IngestionPipeline, ModelGateway, QdrantAssetStore, QdrantCatalogIndex,
    SearchEngine, SearchError, SearchRequest,
};

#[derive(Parser)]
#[command(name = "vibe-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, default_value = "http://localhost:6333", env = "QDRANT_URL")]
    qdrant_url: String,

    /// Collection holding catalog items
    #[arg(long, default_value = "catalog_items")]
    catalog_collection: String,

    /// Collection holding scraped assets
    #[arg(long, default_value = "scraped_assets")]
    asset_collection: String,

    /// Inference sidecar base URL
    #[arg(long, default_value = "http://localhost:8500", env = "MODEL_URL")]
    model_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Import catalog items from a JSON file, embedding titles on the way.
    ImportCatalog {
        /// JSON array of catalog items.
        #[arg(long)]
        file: String,
    },
    /// Ingest scraped assets listed in a JSON manifest.
    Ingest {
        /// JSON array of asset descriptors (source, source_id, asset_url, caption).
        #[arg(long)]
        manifest: String,
        /// Keep a local copy of each fetched image here.
        #[arg(long)]
        download_dir: Option<String>,
        /// Worker pool size for the batch.
        #[arg(long, default_value = "4")]
        workers: usize,
    },
    /// Soft-retire a catalog item; it stays stored but stops matching.
    Deactivate {
        #[arg(long)]
        item_id: String,
    },
    /// Search the catalog by text query and/or image file.
    Search {
        /// Free-text query.
        #[arg(long)]
        query: Option<String>,
        /// Path to a query image.
        #[arg(long)]
        image: Option<String>,
        /// Number of results to return.
        #[arg(long, default_value = "10")]
        limit: usize,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        /// Comma-separated color filters.
        #[arg(long)]
        colors: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::default();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "vibe-search boot"
    );

    match cli.command {
        Command::ImportCatalog { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let mut items: Vec<CatalogItem> = serde_json::from_str(&raw)?;

            let gateway = HttpModelGateway::new(&cli.model_url);
            for item in &mut items {
                if item.text_embedding.is_some() {
                    continue;
                }
                let description = [
                    Some(item.title.as_str()),
                    item.brand.as_deref(),
                    item.category.as_deref(),
                    item.sub_category.as_deref(),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");

                let mut embedding = gateway
                    .embed_text(&description)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                if embedding.len() != config.text_dimensions {
                    anyhow::bail!(
                        "text embedding dimension {} does not match configured {}",
                        embedding.len(),
                        config.text_dimensions
                    );
                }
                normalize_l2(&mut embedding);
                item.text_embedding = Some(embedding);
            }

            let catalog = QdrantCatalogIndex::new(
                &cli.qdrant_url,
                &cli.catalog_collection,
                config.image_dimensions,
                config.text_dimensions,
            );
            catalog
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            catalog
                .upsert_items(&items)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "{} catalog items imported at {}",
                items.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ingest {
            manifest,
            download_dir,
            workers,
        } => {
            let raw = tokio::fs::read_to_string(&manifest).await?;
            let descriptors: Vec<AssetDescriptor> = serde_json::from_str(&raw)?;
            if descriptors.is_empty() {
                println!("manifest is empty, nothing to ingest");
                return Ok(());
            }

            let mut config = config;
            config.worker_pool_size = workers;

            let store = QdrantAssetStore::new(
                &cli.qdrant_url,
                &cli.asset_collection,
                config.image_dimensions,
            );
            store
                .ensure_collection()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let gateway = HttpModelGateway::new(&cli.model_url);
            let fetcher = HttpAssetFetcher::new(Duration::from_secs(10))
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let mut pipeline = IngestionPipeline::new(store, gateway, fetcher, config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            if let Some(dir) = download_dir {
                pipeline = pipeline.with_download_dir(PathBuf::from(dir));
            }
            let pipeline = Arc::new(pipeline);

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("cancellation requested, draining batch");
                    let _ = cancel_tx.send(true);
                }
            });

            let report = pipeline
                .run_batch(descriptors, cancel_rx)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "persisted={} rejected={} duplicates={} failed={}",
                report.persisted.len(),
                report.rejected.len(),
                report.duplicates,
                report.failures.len()
            );
            for failure in &report.failures {
                println!("failed: {} ({})", failure.asset_url, failure.reason);
            }
        }
        Command::Deactivate { item_id } => {
            let catalog = QdrantCatalogIndex::new(
                &cli.qdrant_url,
                &cli.catalog_collection,
                config.image_dimensions,
                config.text_dimensions,
            );
            catalog
                .deactivate_item(&item_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("item {item_id} deactivated");
        }
        Command::Search {
            query,
            image,
            limit,
            category,
            brand,
            gender,
            colors,
            min_price,
            max_price,
        } => {
            let image_bytes = match image {
                Some(path) => Some(tokio::fs::read(&path).await?),
                None => None,
            };

            let filters = ExplicitFilters {
                category,
                brand,
                gender,
                colors: colors
                    .map(|list| {
                        list.split(',')
                            .map(|color| color.trim().to_string())
                            .filter(|color| !color.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                min_price,
                max_price,
            };

            let index = QdrantCatalogIndex::new(
                &cli.qdrant_url,
                &cli.catalog_collection,
                config.image_dimensions,
                config.text_dimensions,
            );
            let gateway = HttpModelGateway::new(&cli.model_url);
            let engine = SearchEngine::new(index, gateway, config)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let request = SearchRequest {
                text: query,
                image: image_bytes,
                filters,
                limit,
            };

            match engine.search(&request).await {
                Ok(response) => {
                    println!(
                        "{} results in {} ms",
                        response.total, response.query_time_ms
                    );
                    for (position, ranked) in response.items.iter().enumerate() {
                        let item = &ranked.item;
                        println!(
                            "{:>2}. score={:.4} [{}] {}",
                            position + 1,
                            ranked.score,
                            item.item_id,
                            item.title
                        );
                        println!(
                            "    category={} price={}",
                            item.category.as_deref().unwrap_or("-"),
                            item.price
                                .map(|price| format!("{price:.2}"))
                                .unwrap_or_else(|| "-".to_string())
                        );
                    }
                }
                Err(SearchError::Timeout(ms)) => {
                    anyhow::bail!("search timed out after {ms} ms; no results were computed");
                }
                Err(error) => return Err(anyhow::anyhow!(error.to_string())),
            }
        }
    }

    Ok(())
}
