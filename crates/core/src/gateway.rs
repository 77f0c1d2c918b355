use crate::error::ModelError;
use crate::models::BoundingBox;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// One object found in an image by the detection model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Raw model-side quality signals for one image. Thresholding happens in
/// the pipeline, not here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityScores {
    pub blur: f32,
    pub brightness: f32,
    pub colorfulness: f32,
    pub nsfw: f32,
}

/// Boundary to the inference stack. The core validates shapes and
/// dimensions of what comes back but never looks inside the models.
/// Implementations must be safe to call concurrently from many workers.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, ModelError>;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    async fn detect(&self, bytes: &[u8]) -> Result<Vec<Detection>, ModelError>;

    async fn score_quality(&self, bytes: &[u8]) -> Result<QualityScores, ModelError>;
}

/// Scales a vector to unit L2 norm in place. A zero vector is left as is.
pub fn normalize_l2(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

/// Gateway client for an HTTP inference sidecar. Image payloads travel as
/// base64 in JSON; responses are deserialized into fixed-shape structs
/// before anything else touches them.
pub struct HttpModelGateway {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image_base64: &'a str,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct DetectionResponse {
    detections: Vec<Detection>,
}

impl HttpModelGateway {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn post_image<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        bytes: &[u8],
    ) -> Result<T, ModelError> {
        let encoded = STANDARD.encode(bytes);
        let response = self
            .client
            .post(format!("{}/{}", self.endpoint.trim_end_matches('/'), path))
            .json(&ImageRequest {
                image_base64: &encoded,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ModelError::Inference(format!(
                "{path} returned {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|error| ModelError::InvalidResponse(error.to_string()))
    }
}

#[async_trait]
impl ModelGateway for HttpModelGateway {
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, ModelError> {
        let parsed: EmbeddingResponse = self.post_image("v1/embed/image", bytes).await?;
        if parsed.embedding.is_empty() {
            return Err(ModelError::InvalidResponse(
                "empty image embedding".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/embed/text",
                self.endpoint.trim_end_matches('/')
            ))
            .json(&TextRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ModelError::Inference(format!(
                "v1/embed/text returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| ModelError::InvalidResponse(error.to_string()))?;
        if parsed.embedding.is_empty() {
            return Err(ModelError::InvalidResponse(
                "empty text embedding".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }

    async fn detect(&self, bytes: &[u8]) -> Result<Vec<Detection>, ModelError> {
        let parsed: DetectionResponse = self.post_image("v1/detect", bytes).await?;
        for detection in &parsed.detections {
            if !(0.0..=1.0).contains(&detection.confidence) {
                return Err(ModelError::InvalidResponse(format!(
                    "detection confidence {} out of range",
                    detection.confidence
                )));
            }
        }
        Ok(parsed.detections)
    }

    async fn score_quality(&self, bytes: &[u8]) -> Result<QualityScores, ModelError> {
        self.post_image("v1/quality", bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_l2;

    #[test]
    fn normalization_yields_unit_norm() {
        let mut vector = vec![3.0, 4.0];
        normalize_l2(&mut vector);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((vector[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_left_untouched() {
        let mut vector = vec![0.0, 0.0, 0.0];
        normalize_l2(&mut vector);
        assert_eq!(vector, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut vector = vec![1.0, 2.0, 2.0];
        normalize_l2(&mut vector);
        let once = vector.clone();
        normalize_l2(&mut vector);
        for (a, b) in once.iter().zip(vector.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
