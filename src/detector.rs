//! # Ingredient Detection Module
//!
//! Sends fridge photos to the object detection service and turns its class
//! labels into catalog ingredient names.
//!
//! ## Flow
//!
//! 1. [`ImageUpload::validate`] checks size and format before any network call
//! 2. An [`IngredientDetector`] returns raw detections
//! 3. [`detect_ingredients`] bounds the call with a timeout and maps classes
//!    through the [`IngredientCatalog`]

use async_trait::async_trait;
use image::ImageFormat;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::IngredientCatalog;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::DetectorConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error("Invalid image: {0}")]
    Validation(String),

    #[error("No ingredients recognized")]
    NoIngredients,

    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Detection service unavailable, circuit open")]
    CircuitOpen,

    #[error("Detection service error: {0}")]
    Service(String),
}

/// Formats the detection service accepts
pub fn is_supported_format(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Bmp
            | ImageFormat::Tiff
            | ImageFormat::WebP
            | ImageFormat::Gif
    )
}

fn mime_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        _ => "application/octet-stream",
    }
}

/// An image that passed validation
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub format: ImageFormat,
}

impl ImageUpload {
    /// Check the size limit and sniff the format from the leading bytes
    pub fn validate(
        bytes: Vec<u8>,
        filename: &str,
        config: &DetectorConfig,
    ) -> Result<Self, DetectError> {
        if bytes.is_empty() {
            return Err(DetectError::Validation("image is required".to_string()));
        }
        if bytes.len() as u64 > config.max_upload_size {
            return Err(DetectError::Validation(format!(
                "image is {} bytes, limit is {}",
                bytes.len(),
                config.max_upload_size
            )));
        }
        if bytes.len() < config.min_format_bytes {
            return Err(DetectError::Validation(format!(
                "need at least {} bytes to determine the format",
                config.min_format_bytes
            )));
        }

        let format = image::guess_format(&bytes)
            .map_err(|e| DetectError::Validation(format!("unknown image format: {e}")))?;
        if !is_supported_format(format) {
            return Err(DetectError::Validation(format!(
                "unsupported image format {format:?}"
            )));
        }

        debug!("Accepted {:?} upload of {} bytes", format, bytes.len());
        Ok(Self {
            bytes,
            filename: filename.to_string(),
            format,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        mime_type(self.format)
    }
}

/// One object found by the detection service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    pub class_name: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    success: bool,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Object detection backend
#[async_trait]
pub trait IngredientDetector: Send + Sync {
    async fn detect(&self, upload: &ImageUpload) -> Result<Vec<Detection>, DetectError>;
}

/// Detection service reached over HTTP (`POST {base_url}/detect/`)
pub struct HttpDetector {
    client: reqwest::Client,
    config: DetectorConfig,
    breaker: CircuitBreaker,
}

impl HttpDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, DetectError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| DetectError::Service(e.to_string()))?;
        let breaker = CircuitBreaker::new(config.breaker.clone());
        Ok(Self {
            client,
            config,
            breaker,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/detect/", self.config.base_url.trim_end_matches('/'))
    }

    async fn call(&self, upload: &ImageUpload) -> Result<Vec<Detection>, DetectError> {
        let part = Part::bytes(upload.bytes.clone())
            .file_name(upload.filename.clone())
            .mime_str(upload.mime_type())
            .map_err(|e| DetectError::Service(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint())
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectError::Timeout(self.config.timeout())
                } else {
                    DetectError::Service(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Service(format!("detector returned {status}")));
        }

        let body: DetectionResponse = response
            .json()
            .await
            .map_err(|e| DetectError::Service(format!("unreadable detector response: {e}")))?;
        if !body.success {
            return Err(DetectError::Service("detector reported failure".to_string()));
        }

        Ok(body.detections)
    }
}

#[async_trait]
impl IngredientDetector for HttpDetector {
    async fn detect(&self, upload: &ImageUpload) -> Result<Vec<Detection>, DetectError> {
        if !self.breaker.try_acquire() {
            warn!("Detector circuit open, rejecting upload");
            return Err(DetectError::CircuitOpen);
        }

        match self.call(upload).await {
            Ok(detections) => {
                self.breaker.record_success();
                Ok(detections)
            }
            Err(err) => {
                self.breaker.record_failure();
                warn!(
                    "Detection failed ({} consecutive): {err}",
                    self.breaker.failure_count()
                );
                Err(err)
            }
        }
    }
}

/// Detect ingredients in `upload` and return their catalog names
///
/// The whole call is bounded by `timeout`. Classes missing from the catalog
/// are dropped; an image with no known ingredient is a validation failure.
pub async fn detect_ingredients(
    detector: &dyn IngredientDetector,
    catalog: &IngredientCatalog,
    upload: &ImageUpload,
    timeout: Duration,
) -> Result<Vec<String>, DetectError> {
    let detections = tokio::time::timeout(timeout, detector.detect(upload))
        .await
        .map_err(|_| DetectError::Timeout(timeout))??;

    let names = catalog.map_detections(detections.iter().map(|d| d.class_name.as_str()));
    info!(
        "Detected {} objects, {} known ingredients",
        detections.len(),
        names.len()
    );

    if names.is_empty() {
        return Err(DetectError::NoIngredients);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 16] = [
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];

    struct FixedDetector(Vec<&'static str>);

    #[async_trait]
    impl IngredientDetector for FixedDetector {
        async fn detect(&self, _upload: &ImageUpload) -> Result<Vec<Detection>, DetectError> {
            Ok(self
                .0
                .iter()
                .map(|class| Detection {
                    class_name: class.to_string(),
                    confidence: Some(0.9),
                })
                .collect())
        }
    }

    fn png_upload() -> ImageUpload {
        ImageUpload::validate(PNG_HEADER.to_vec(), "fridge.png", &DetectorConfig::default()).unwrap()
    }

    #[test]
    fn test_png_is_accepted() {
        let upload = png_upload();
        assert_eq!(upload.format, ImageFormat::Png);
        assert_eq!(upload.mime_type(), "image/png");
    }

    #[test]
    fn test_text_is_rejected() {
        let err = ImageUpload::validate(b"just some text".to_vec(), "notes.txt", &DetectorConfig::default())
            .unwrap_err();
        assert!(matches!(err, DetectError::Validation(_)));
    }

    #[test]
    fn test_oversized_upload_is_rejected() {
        let config = DetectorConfig {
            max_upload_size: 8,
            ..Default::default()
        };
        let err = ImageUpload::validate(PNG_HEADER.to_vec(), "big.png", &config).unwrap_err();
        assert!(matches!(err, DetectError::Validation(msg) if msg.contains("limit")));
    }

    #[test]
    fn test_short_upload_is_rejected() {
        let err = ImageUpload::validate(vec![0x89, b'P'], "tiny.png", &DetectorConfig::default())
            .unwrap_err();
        assert!(matches!(err, DetectError::Validation(_)));
    }

    #[tokio::test]
    async fn test_detections_are_mapped_and_deduplicated() {
        let catalog = IngredientCatalog::from_pairs([("egg", "계란"), ("rice", "쌀")]);
        let detector = FixedDetector(vec!["egg", "bowl", "egg", "rice"]);

        let names = detect_ingredients(&detector, &catalog, &png_upload(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(names, vec!["계란", "쌀"]);
    }

    #[tokio::test]
    async fn test_no_known_ingredient() {
        let catalog = IngredientCatalog::from_pairs([("egg", "계란")]);
        let detector = FixedDetector(vec!["bowl"]);

        let err = detect_ingredients(&detector, &catalog, &png_upload(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, DetectError::NoIngredients);
    }
}
