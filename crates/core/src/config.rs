use crate::models::QualityReport;
use crate::retry::RetryPolicy;
use serde::Deserialize;

/// CLIP ViT-B/32 class image models produce 512-dimensional vectors.
pub const IMAGE_EMBEDDING_DIMENSIONS: usize = 512;

/// MiniLM-L6-v2 class sentence models produce 384-dimensional vectors.
pub const TEXT_EMBEDDING_DIMENSIONS: usize = 384;

/// Quality gate thresholds. An image failing any of these is rejected
/// before any embedding cost is spent.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityThresholds {
    /// Laplacian-variance style sharpness; below this the image is too blurry.
    pub blur_min: f32,
    /// NSFW probability above this rejects the image.
    pub nsfw_max: f32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            blur_min: 50.0,
            nsfw_max: 0.6,
            min_width: 100,
            min_height: 100,
        }
    }
}

impl QualityThresholds {
    pub fn resolution_ok(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }

    pub fn evaluate(
        &self,
        width: u32,
        height: u32,
        blur: f32,
        brightness: f32,
        colorfulness: f32,
        nsfw: f32,
    ) -> QualityReport {
        let resolution_ok = self.resolution_ok(width, height);
        let is_blurry = blur < self.blur_min;
        let is_nsfw = nsfw > self.nsfw_max;
        QualityReport {
            width,
            height,
            blur_score: blur,
            brightness,
            colorfulness,
            nsfw_score: nsfw,
            resolution_ok,
            is_acceptable: resolution_ok && !is_blurry && !is_nsfw,
        }
    }
}

/// Additive boosts applied on top of vector similarity when the query
/// carries keywords.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoostWeights {
    pub title: f64,
    pub category: f64,
    pub sub_category: f64,
}

impl Default for BoostWeights {
    fn default() -> Self {
        Self {
            title: 0.30,
            category: 0.20,
            sub_category: 0.10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub image_dimensions: usize,
    pub text_dimensions: usize,
    pub quality: QualityThresholds,
    pub retry: RetryPolicy,
    pub worker_pool_size: usize,
    /// Minimum spacing between upstream fetches, independent of pool size.
    pub fetch_min_interval_ms: u64,
    pub boosts: BoostWeights,
    pub search_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image_dimensions: IMAGE_EMBEDDING_DIMENSIONS,
            text_dimensions: TEXT_EMBEDDING_DIMENSIONS,
            quality: QualityThresholds::default(),
            retry: RetryPolicy::default(),
            worker_pool_size: 4,
            fetch_min_interval_ms: 2_000,
            boosts: BoostWeights::default(),
            search_timeout_ms: 5_000,
        }
    }
}
