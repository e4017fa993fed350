use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, header},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::cache::AnalysisCache;
use crate::error::ApiError;
use crate::metrics::{ANALYZE_LATENCY, CACHE_HITS, CACHE_MISSES};
use crate::models::{
    AnalysisResponse, AnalyzeUrlRequest, DetectionConfidence, default_max_objects,
};
use crate::state::AppState;
use crate::vision;

// Bearer-token check for the analyze endpoints. An empty key list
// means open access (development mode).
fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if state.api_keys.is_empty() {
        return Ok(());
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if state.api_keys.iter().any(|key| key == token) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn check_max_objects(max_objects: usize) -> Result<(), ApiError> {
    if (1..=100).contains(&max_objects) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "max_objects must be between 1 and 100".to_string(),
        ))
    }
}

// Analyze an uploaded image. Multipart fields: `image` (required),
// `confidence_threshold`, `max_objects`, `include_metadata`.
pub async fn analyze_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    check_api_key(&state, &headers)?;

    let mut image: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut confidence = DetectionConfidence::default();
    let mut max_objects = default_max_objects();
    let mut include_metadata = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("malformed multipart body: {err}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let content_type = field.content_type().map(str::to_string);
                let filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::BadRequest(format!("failed to read image: {err}")))?;
                image = Some((bytes, content_type, filename));
            }
            Some("confidence_threshold") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(err.to_string()))?;
                confidence = text.parse().map_err(ApiError::BadRequest)?;
            }
            Some("max_objects") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(err.to_string()))?;
                max_objects = text
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid max_objects: {text}")))?;
            }
            Some("include_metadata") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::BadRequest(err.to_string()))?;
                include_metadata = text.parse().map_err(|_| {
                    ApiError::BadRequest(format!("invalid include_metadata: {text}"))
                })?;
            }
            _ => {}
        }
    }

    let (bytes, content_type, filename) =
        image.ok_or_else(|| ApiError::BadRequest("missing 'image' field".to_string()))?;
    check_max_objects(max_objects)?;

    if let Some(content_type) = &content_type {
        if !content_type.starts_with("image/") {
            return Err(ApiError::UnsupportedMediaType(content_type.clone()));
        }
    }
    vision::validate_payload(&bytes, state.max_image_bytes)?;

    let cache_key = AnalysisCache::key(&[
        &bytes,
        confidence.as_str().as_bytes(),
        &max_objects.to_le_bytes(),
    ]);
    if let Some(mut hit) = state.cache.get(&cache_key) {
        CACHE_HITS.inc();
        hit.cached = true;
        return Ok(Json(hit));
    }
    CACHE_MISSES.inc();

    let started = Instant::now();
    let mut outcome = state
        .vision
        .detect_bytes(bytes.clone(), confidence.threshold(), max_objects)
        .await?;
    let elapsed = started.elapsed();
    ANALYZE_LATENCY.observe(elapsed.as_secs_f64());

    if let Some(metadata) = &mut outcome.metadata {
        metadata.size_bytes = Some(bytes.len());
    }

    let response = AnalysisResponse {
        request_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        total_objects_detected: outcome.objects.len(),
        detected_objects: outcome.objects,
        image_metadata: include_metadata.then_some(outcome.metadata).flatten(),
        processing_time_ms: elapsed.as_secs_f64() * 1000.0,
        confidence_threshold: confidence.threshold(),
        cached: false,
    };

    info!(
        filename = filename.as_deref().unwrap_or("unnamed"),
        size = bytes.len(),
        objects = response.total_objects_detected,
        "upload analysis complete"
    );

    state.cache.put(cache_key, &response);
    Ok(Json(response))
}

// Analyze an image behind a public URL
pub async fn analyze_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeUrlRequest>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    check_api_key(&state, &headers)?;
    check_max_objects(request.max_objects)?;

    if !request.image_url.starts_with("http://") && !request.image_url.starts_with("https://") {
        return Err(ApiError::BadRequest(format!(
            "image_url must be an http(s) URL: {}",
            request.image_url
        )));
    }

    let confidence = request.confidence_threshold;
    let cache_key = AnalysisCache::key(&[
        request.image_url.as_bytes(),
        confidence.as_str().as_bytes(),
        &request.max_objects.to_le_bytes(),
    ]);
    if let Some(mut hit) = state.cache.get(&cache_key) {
        CACHE_HITS.inc();
        hit.cached = true;
        return Ok(Json(hit));
    }
    CACHE_MISSES.inc();

    let started = Instant::now();
    let outcome = state
        .vision
        .detect_url(&request.image_url, confidence.threshold(), request.max_objects)
        .await?;
    let elapsed = started.elapsed();
    ANALYZE_LATENCY.observe(elapsed.as_secs_f64());

    let response = AnalysisResponse {
        request_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        total_objects_detected: outcome.objects.len(),
        detected_objects: outcome.objects,
        image_metadata: request.include_metadata.then_some(outcome.metadata).flatten(),
        processing_time_ms: elapsed.as_secs_f64() * 1000.0,
        confidence_threshold: confidence.threshold(),
        cached: false,
    };

    info!(
        url = %request.image_url,
        objects = response.total_objects_detected,
        "url analysis complete"
    );

    state.cache.put(cache_key, &response);
    Ok(Json(response))
}
