use std::time::Duration;

use axum::body::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Args;
use crate::metrics::UPSTREAM_FAILURES;
use crate::models::{BoundingBox, DetectedObject, ImageMetadata};

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image data is empty")]
    EmptyImage,

    #[error("image of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("payload is not a recognized image format")]
    UnrecognizedFormat,

    #[error("image is not reachable: {0}")]
    Unreachable(String),

    #[error("vision API error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("request to the vision API timed out")]
    Timeout,

    #[error("failed to reach the vision API: {0}")]
    Transport(String),

    #[error("could not decode the vision API response: {0}")]
    Decode(String),
}

// Detections plus image metadata for one analyzed image
#[derive(Debug)]
pub struct DetectOutcome {
    pub objects: Vec<DetectedObject>,
    pub metadata: Option<ImageMetadata>,
}

// Client for the Computer Vision object-detection endpoint. One
// shared reqwest client, key auth, bounded retry on transient
// failures.
pub struct VisionClient {
    http: reqwest::Client,
    endpoint: String,
    key: String,
    api_version: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl VisionClient {
    pub fn from_args(args: &Args) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(args.request_timeout))
            .build()
            .expect("failed to build http client");

        Self {
            http,
            endpoint: args.vision_endpoint.trim_end_matches('/').to_string(),
            key: args.vision_key.clone(),
            api_version: args.api_version.clone(),
            max_retries: args.max_retries,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Object detection on an image behind a public URL.
    pub async fn detect_url(
        &self,
        image_url: &str,
        threshold: f32,
        max_objects: usize,
    ) -> Result<DetectOutcome, VisionError> {
        let request = self
            .http
            .post(self.detect_endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .json(&serde_json::json!({ "url": image_url }));

        let response = self.send_with_retry(request).await?;
        Ok(convert(response, threshold, max_objects))
    }

    /// Object detection on raw image bytes.
    pub async fn detect_bytes(
        &self,
        image: Bytes,
        threshold: f32,
        max_objects: usize,
    ) -> Result<DetectOutcome, VisionError> {
        let request = self
            .http
            .post(self.detect_endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image);

        let response = self.send_with_retry(request).await?;
        Ok(convert(response, threshold, max_objects))
    }

    fn detect_endpoint(&self) -> String {
        format!("{}/vision/{}/detect", self.endpoint, self.api_version)
    }

    async fn send_with_retry(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<DetectResponse, VisionError> {
        let result = self.try_send(request).await;
        if result.is_err() {
            UPSTREAM_FAILURES.inc();
        }
        result
    }

    // Retries connect errors, timeouts and 5xx responses with a fixed
    // delay. 4xx responses are terminal.
    async fn try_send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<DetectResponse, VisionError> {
        let mut last_err = VisionError::Transport("request was never attempted".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, "retrying vision request");
                tokio::time::sleep(self.retry_delay).await;
            }

            let Some(request) = request.try_clone() else {
                return Err(VisionError::Transport(
                    "request body cannot be replayed".to_string(),
                ));
            };

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<DetectResponse>()
                            .await
                            .map_err(|err| VisionError::Decode(err.to_string()));
                    }

                    let body = response.text().await.unwrap_or_default();
                    let (code, message) = parse_azure_error(&body, status.as_u16());

                    if status.is_server_error() {
                        warn!(status = status.as_u16(), "vision API server error");
                        last_err = VisionError::Upstream {
                            status: status.as_u16(),
                            message,
                        };
                        continue;
                    }

                    return Err(classify_client_error(status.as_u16(), &code, message));
                }
                Err(err) if err.is_timeout() => {
                    warn!("vision API request timed out");
                    last_err = VisionError::Timeout;
                }
                Err(err) if err.is_connect() => {
                    warn!(%err, "vision API is unreachable");
                    last_err = VisionError::Transport(err.to_string());
                }
                Err(err) => return Err(VisionError::Transport(err.to_string())),
            }
        }

        Err(last_err)
    }
}

// Payload checks performed before any upstream call. Returns the
// sniffed format name.
pub fn validate_payload(data: &[u8], max_bytes: usize) -> Result<&'static str, VisionError> {
    if data.is_empty() {
        return Err(VisionError::EmptyImage);
    }
    if data.len() > max_bytes {
        return Err(VisionError::TooLarge {
            size: data.len(),
            max: max_bytes,
        });
    }
    sniff_format(data).ok_or(VisionError::UnrecognizedFormat)
}

// Magic-number sniffing for the formats the backend accepts
pub fn sniff_format(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if data.starts_with(b"GIF8") {
        Some("gif")
    } else if data.starts_with(b"BM") {
        Some("bmp")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

// Wire format of the detect-objects response
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    objects: Vec<WireObject>,
    metadata: Option<WireMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireObject {
    rectangle: WireRectangle,
    #[serde(rename = "object")]
    name: String,
    confidence: f32,
    parent: Option<WireParent>,
}

#[derive(Debug, Deserialize)]
struct WireRectangle {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

#[derive(Debug, Deserialize)]
struct WireParent {
    #[serde(rename = "object")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireMetadata {
    width: u32,
    height: u32,
    format: String,
}

#[derive(Debug, Deserialize)]
struct AzureErrorBody {
    error: Option<AzureErrorDetail>,
}

#[derive(Debug, Deserialize, Default)]
struct AzureErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn convert(response: DetectResponse, threshold: f32, max_objects: usize) -> DetectOutcome {
    let mut objects = Vec::new();
    for wire in response.objects {
        if wire.confidence < threshold {
            continue;
        }
        if objects.len() >= max_objects {
            break;
        }
        objects.push(DetectedObject {
            name: wire.name,
            confidence: wire.confidence,
            bounding_box: BoundingBox {
                x: wire.rectangle.x,
                y: wire.rectangle.y,
                width: wire.rectangle.w,
                height: wire.rectangle.h,
            },
            parent: wire.parent.map(|p| p.name),
        });
    }

    let metadata = response.metadata.map(|m| ImageMetadata {
        width: m.width,
        height: m.height,
        format: m.format.to_ascii_lowercase(),
        size_bytes: None,
    });

    DetectOutcome { objects, metadata }
}

fn parse_azure_error(body: &str, status: u16) -> (String, String) {
    match serde_json::from_str::<AzureErrorBody>(body) {
        Ok(AzureErrorBody { error: Some(detail) }) if !detail.message.is_empty() => {
            (detail.code, detail.message)
        }
        _ => (String::new(), format!("vision API returned status {status}")),
    }
}

fn classify_client_error(status: u16, code: &str, message: String) -> VisionError {
    match code {
        "InvalidImageUrl" | "DownloadFailed" => VisionError::Unreachable(message),
        "InvalidImageFormat" => VisionError::UnrecognizedFormat,
        _ => VisionError::Upstream { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect_fixture() -> DetectResponse {
        serde_json::from_value(serde_json::json!({
            "objects": [
                {
                    "rectangle": { "x": 25, "y": 43, "w": 172, "h": 140 },
                    "object": "person",
                    "confidence": 0.897,
                    "parent": { "object": "mammal", "confidence": 0.91 }
                },
                {
                    "rectangle": { "x": 0, "y": 0, "w": 50, "h": 50 },
                    "object": "tree",
                    "confidence": 0.42
                },
                {
                    "rectangle": { "x": 300, "y": 12, "w": 60, "h": 80 },
                    "object": "car",
                    "confidence": 0.73
                }
            ],
            "requestId": "c1e9f2b8-0000-0000-0000-000000000000",
            "metadata": { "width": 1260, "height": 473, "format": "Jpeg" }
        }))
        .unwrap()
    }

    #[test]
    fn convert_filters_below_threshold() {
        let outcome = convert(detect_fixture(), 0.5, 50);
        let names: Vec<&str> = outcome.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["person", "car"]);
        assert_eq!(outcome.objects[0].parent.as_deref(), Some("mammal"));
        assert_eq!(
            outcome.objects[0].bounding_box,
            BoundingBox {
                x: 25,
                y: 43,
                width: 172,
                height: 140
            }
        );
    }

    #[test]
    fn convert_truncates_to_max_objects() {
        let outcome = convert(detect_fixture(), 0.0, 1);
        assert_eq!(outcome.objects.len(), 1);
        assert_eq!(outcome.objects[0].name, "person");
    }

    #[test]
    fn convert_lowercases_metadata_format() {
        let outcome = convert(detect_fixture(), 0.5, 50);
        let metadata = outcome.metadata.unwrap();
        assert_eq!(metadata.format, "jpeg");
        assert_eq!(metadata.width, 1260);
        assert_eq!(metadata.height, 473);
        assert!(metadata.size_bytes.is_none());
    }

    #[test]
    fn sniffs_common_image_formats() {
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpeg"));
        assert_eq!(sniff_format(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]), Some("png"));
        assert_eq!(sniff_format(b"GIF89a..."), Some("gif"));
        assert_eq!(sniff_format(b"BM....."), Some("bmp"));
        assert_eq!(sniff_format(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some("webp"));
        assert_eq!(sniff_format(b"<html>"), None);
        assert_eq!(sniff_format(b""), None);
    }

    #[test]
    fn validate_rejects_bad_payloads() {
        assert!(matches!(
            validate_payload(&[], 1024),
            Err(VisionError::EmptyImage)
        ));
        assert!(matches!(
            validate_payload(&[0xFF, 0xD8, 0xFF, 0x00], 3),
            Err(VisionError::TooLarge { size: 4, max: 3 })
        ));
        assert!(matches!(
            validate_payload(b"not an image", 1024),
            Err(VisionError::UnrecognizedFormat)
        ));
        assert!(matches!(
            validate_payload(&[0xFF, 0xD8, 0xFF, 0x00], 1024),
            Ok("jpeg")
        ));
    }

    #[test]
    fn azure_errors_classify_by_code() {
        assert!(matches!(
            classify_client_error(400, "InvalidImageUrl", "no".to_string()),
            VisionError::Unreachable(_)
        ));
        assert!(matches!(
            classify_client_error(400, "DownloadFailed", "no".to_string()),
            VisionError::Unreachable(_)
        ));
        assert!(matches!(
            classify_client_error(400, "InvalidImageFormat", "no".to_string()),
            VisionError::UnrecognizedFormat
        ));
        assert!(matches!(
            classify_client_error(401, "", "denied".to_string()),
            VisionError::Upstream { status: 401, .. }
        ));
    }

    #[test]
    fn azure_error_bodies_parse_with_fallback() {
        let (code, message) =
            parse_azure_error(r#"{"error":{"code":"InvalidImageUrl","message":"bad url"}}"#, 400);
        assert_eq!(code, "InvalidImageUrl");
        assert_eq!(message, "bad url");

        let (code, message) = parse_azure_error("<html>gateway</html>", 503);
        assert!(code.is_empty());
        assert_eq!(message, "vision API returned status 503");
    }
}
