//! HTTP routes and handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::state::AppState;
use estpii_analyzer::{AnalysisOutcome, AnalysisRequest, RecognizerFailure, RecognizerInfo};
use estpii_anonymizer::{AnonymizationResult, AnonymizerEngine, Operator};
use estpii_core::{AnalysisExplanation, EntityType, Error, Language};

/// Service name reported by the status endpoint
pub const SERVICE_NAME: &str = "Estonian PII API";

pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/analyze", post(analyze))
        .route("/anonymize", post(anonymize))
        .route("/supportedentities", get(supported_entities))
        .route("/recognizers", get(recognizers))
        .route("/config", get(configuration))
        .route("/metrics", get(metrics))
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::map_response(json_payload_too_large))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Give the body limit's plain-text 413 the same `{error}` shape as other errors
async fn json_payload_too_large(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes().starts_with(b"application/json"));

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return AppError::PayloadTooLarge.into_response();
    }
    response
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "supported_languages": state.config.analyzer.supported_languages,
        "model": state.config.model_summary(),
    }))
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Body of `POST /analyze`
#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    text: Option<String>,
    language: Option<Language>,
    entities: Option<Vec<EntityType>>,
    score_threshold: Option<f32>,
    #[serde(default)]
    return_decision_process: bool,
    correlation_id: Option<String>,
}

/// Body of `POST /anonymize`
#[derive(Debug, Deserialize)]
struct AnonymizeRequest {
    text: Option<String>,
    language: Option<Language>,
    entities: Option<Vec<EntityType>>,
    score_threshold: Option<f32>,
    /// Operator per entity type, or `DEFAULT`
    #[serde(default)]
    anonymizers: HashMap<String, Operator>,
    correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    text: String,
    results: Vec<AnalyzerResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed_recognizers: Vec<RecognizerFailure>,
}

#[derive(Debug, Serialize)]
struct AnalyzerResult {
    entity_type: EntityType,
    start: usize,
    end: usize,
    score: f32,
    recognition_metadata: RecognitionMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_explanation: Option<AnalysisExplanation>,
}

#[derive(Debug, Serialize)]
struct RecognitionMetadata {
    recognizer_name: String,
    recognizer_identifier: String,
}

#[derive(Debug, Deserialize)]
struct LanguageQuery {
    language: Option<Language>,
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    metrics::counter!("estpii_requests_total", "endpoint" => "analyze").increment(1);

    let Json(req) = payload?;
    let text = req.text.ok_or_else(missing_text)?;
    let correlation_id = req.correlation_id.unwrap_or_else(new_correlation_id);

    let request = AnalysisRequest {
        text: &text,
        language: req.language,
        entities: req.entities,
        score_threshold: req.score_threshold,
        return_decision_process: req.return_decision_process,
        correlation_id: Some(correlation_id),
    };
    let outcome = run_analysis(&state, &request).await?;

    let results = outcome
        .result
        .iter()
        .map(|span| AnalyzerResult {
            entity_type: span.entity_type.clone(),
            start: span.start,
            end: span.end,
            score: span.score,
            recognition_metadata: RecognitionMetadata {
                recognizer_name: span.recognizer_name.clone(),
                recognizer_identifier: span.recognizer_id.clone(),
            },
            analysis_explanation: span.explanation.clone(),
        })
        .collect();

    Ok(Json(AnalyzeResponse {
        results,
        failed_recognizers: outcome.failures,
        text,
    }))
}

async fn anonymize(
    State(state): State<AppState>,
    payload: Result<Json<AnonymizeRequest>, JsonRejection>,
) -> Result<Json<AnonymizationResult>, AppError> {
    metrics::counter!("estpii_requests_total", "endpoint" => "anonymize").increment(1);

    let Json(req) = payload?;
    let text = req.text.ok_or_else(missing_text)?;
    AnonymizerEngine::validate_overrides(&req.anonymizers)?;
    let correlation_id = req.correlation_id.unwrap_or_else(new_correlation_id);

    let request = AnalysisRequest {
        text: &text,
        language: req.language,
        entities: req.entities,
        score_threshold: req.score_threshold,
        return_decision_process: false,
        correlation_id: Some(correlation_id.clone()),
    };
    let outcome = run_analysis(&state, &request).await?;

    let anonymized = state
        .anonymizer
        .anonymize(&text, &outcome.result, &req.anonymizers)?;

    debug!(
        correlation_id = %correlation_id,
        items = anonymized.items.len(),
        "Anonymized text"
    );
    Ok(Json(anonymized))
}

async fn supported_entities(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let language = query
        .language
        .unwrap_or_else(|| state.analyzer.default_language().clone());
    let entities = state.analyzer.registry().supported_entities(&language)?;

    Ok(Json(json!({
        "count": entities.len(),
        "entities": entities,
        "language": language,
    })))
}

async fn recognizers(
    State(state): State<AppState>,
    Query(query): Query<LanguageQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let language = query
        .language
        .unwrap_or_else(|| state.analyzer.default_language().clone());
    let infos: Vec<RecognizerInfo> = state.analyzer.registry().recognizer_infos(&language)?;

    Ok(Json(json!({
        "count": infos.len(),
        "recognizers": infos,
        "language": language,
    })))
}

/// Read-only view of the configuration
async fn configuration(State(state): State<AppState>) -> Json<serde_json::Value> {
    let analyzer = &state.config.analyzer;
    let custom: Vec<serde_json::Value> = analyzer
        .custom_recognizers
        .iter()
        .map(|spec| {
            json!({
                "name": spec.name,
                "type": spec.kind.type_name(),
                "supported_entity": spec.supported_entity,
            })
        })
        .collect();

    Json(json!({
        "supported_languages": analyzer.supported_languages,
        "default_language": analyzer.default_language(),
        "default_score_threshold": analyzer.default_score_threshold,
        "entities_to_detect": analyzer.entities_to_detect,
        "estbert_model": analyzer.estbert_configuration.as_ref().map(|c| &c.model_name),
        "nlp_engine": analyzer.nlp_configuration.as_ref().map(|c| &c.nlp_engine_name),
        "custom_recognizers": custom,
        "default_operators": state.config.anonymization_config.default_operators,
        "conflict_resolution": analyzer.conflict_resolution,
    }))
}

async fn fallback() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

async fn run_analysis(
    state: &AppState,
    request: &AnalysisRequest<'_>,
) -> Result<AnalysisOutcome, AppError> {
    let outcome = state.analyzer.analyze(request).await?;

    for failure in &outcome.failures {
        metrics::counter!(
            "estpii_recognizer_failures_total",
            "recognizer" => failure.recognizer.clone()
        )
        .increment(1);
    }
    for span in &outcome.result {
        metrics::counter!(
            "estpii_entities_detected_total",
            "entity_type" => span.entity_type.to_string()
        )
        .increment(1);
    }
    metrics::histogram!("estpii_analysis_latency_us").record(outcome.latency_us as f64);

    info!(
        correlation_id = request.correlation_id.as_deref().unwrap_or("-"),
        language = %outcome.language,
        entities = outcome.result.len(),
        failed = outcome.failures.len(),
        latency_us = outcome.latency_us,
        "Analyzed request"
    );
    Ok(outcome)
}

fn missing_text() -> AppError {
    AppError::BadRequest("Missing required field: text".to_string())
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    PayloadTooLarge,
    Service(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Service(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge;
        }
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Service(err) => match err {
                Error::InvalidRequest(_) | Error::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
                Error::ModelUnavailable(_)
                | Error::AllRecognizersFailed {
                    model_outage: true, ..
                } => StatusCode::SERVICE_UNAVAILABLE,
                Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::Service(err) => match err {
                Error::InvalidRequest(_) => "invalid_request",
                Error::UnsupportedLanguage(_) => "unsupported_language",
                Error::AllRecognizersFailed { .. } => "all_recognizers_failed",
                Error::ModelUnavailable(_) => "model_unavailable",
                Error::Timeout => "timeout",
                _ => "internal",
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        metrics::counter!("estpii_errors_total", "kind" => self.kind()).increment(1);

        let message = match self {
            AppError::BadRequest(msg) => msg,
            AppError::PayloadTooLarge => "Request body too large".to_string(),
            AppError::Service(err) => err.to_string(),
        };

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Rejected request");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::invalid_request("bad"), StatusCode::BAD_REQUEST),
            (Error::UnsupportedLanguage("fi".into()), StatusCode::BAD_REQUEST),
            (
                Error::AllRecognizersFailed {
                    count: 2,
                    summary: String::new(),
                    model_outage: false,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::AllRecognizersFailed {
                    count: 1,
                    summary: String::new(),
                    model_outage: true,
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (Error::model_unavailable("down"), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Timeout, StatusCode::GATEWAY_TIMEOUT),
            (Error::internal("oops"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
        assert_eq!(AppError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
