use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Detection confidence presets exposed to clients, mapped onto the
// raw threshold sent to the vision backend.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionConfidence {
    Low,
    #[default]
    Medium,
    High,
}

impl DetectionConfidence {
    pub fn threshold(self) -> f32 {
        match self {
            DetectionConfidence::Low => 0.3,
            DetectionConfidence::Medium => 0.5,
            DetectionConfidence::High => 0.7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionConfidence::Low => "low",
            DetectionConfidence::Medium => "medium",
            DetectionConfidence::High => "high",
        }
    }
}

impl FromStr for DetectionConfidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(DetectionConfidence::Low),
            "medium" => Ok(DetectionConfidence::Medium),
            "high" => Ok(DetectionConfidence::High),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}

// Request body for URL-based analysis
#[derive(Deserialize, Debug)]
pub struct AnalyzeUrlRequest {
    pub image_url: String,
    #[serde(default)]
    pub confidence_threshold: DetectionConfidence,
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

pub fn default_max_objects() -> usize {
    50
}

fn default_true() -> bool {
    true
}

// Pixel-coordinate rectangle as reported by the vision backend
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DetectedObject {
    pub name: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
}

// Response shape shared by the upload and URL analysis endpoints
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AnalysisResponse {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub detected_objects: Vec<DetectedObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_metadata: Option<ImageMetadata>,
    pub processing_time_ms: f64,
    pub confidence_threshold: f32,
    pub total_objects_detected: usize,
    pub cached: bool,
}
