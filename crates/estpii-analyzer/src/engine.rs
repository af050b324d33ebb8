//! Analysis engine
//!
//! Runs every recognizer registered for the request language concurrently,
//! isolates individual failures, filters by score threshold and resolves
//! overlaps into a `RecognitionResult`.

use crate::config::AnalyzerConfig;
use crate::overlap::{resolve_overlaps, Candidate, ConflictPolicy};
use crate::recognizer::{is_requested, Recognizer};
use crate::registry::RecognizerRegistry;
use estpii_core::{EntityType, Error, Language, RecognitionResult, Result, Span};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Parameters of one analysis
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest<'a> {
    pub text: &'a str,
    pub language: Option<Language>,
    pub entities: Option<Vec<EntityType>>,
    pub score_threshold: Option<f32>,
    pub return_decision_process: bool,
    pub correlation_id: Option<String>,
}

impl<'a> AnalysisRequest<'a> {
    /// Analyze `text` with engine defaults
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<Language>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_entities(mut self, entities: Vec<EntityType>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    /// Keep per-span explanations in the result
    pub fn with_decision_process(mut self, enabled: bool) -> Self {
        self.return_decision_process = enabled;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A recognizer that did not contribute to a request
#[derive(Debug, Clone, Serialize)]
pub struct RecognizerFailure {
    pub recognizer: String,
    pub recognizer_id: String,
    pub error: String,
    /// The failure was a model outage
    #[serde(skip)]
    pub model_outage: bool,
    /// The recognizer missed the request deadline
    #[serde(skip)]
    pub timed_out: bool,
}

/// Result of one analysis
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: RecognitionResult,
    /// Language whose recognizer set was used
    pub language: Language,
    pub failures: Vec<RecognizerFailure>,
    pub latency_us: u64,
}

/// Multi-recognizer analysis with overlap resolution
pub struct AnalyzerEngine {
    registry: Arc<RecognizerRegistry>,
    priorities: HashMap<EntityType, i32>,
    policy: ConflictPolicy,
    default_threshold: f32,
    default_language: Language,
    default_entities: Vec<EntityType>,
    timeout: Option<Duration>,
}

impl AnalyzerEngine {
    /// Create an engine with default settings
    pub fn new(registry: Arc<RecognizerRegistry>) -> Self {
        Self {
            registry,
            priorities: HashMap::new(),
            policy: ConflictPolicy::default(),
            default_threshold: 0.0,
            default_language: Language::generic(),
            default_entities: Vec::new(),
            timeout: None,
        }
    }

    /// Create an engine configured from the analyzer configuration
    pub fn from_config(registry: Arc<RecognizerRegistry>, config: &AnalyzerConfig) -> Self {
        Self::new(registry)
            .with_priorities(config.priorities())
            .with_conflict_policy(config.conflict_resolution.clone())
            .with_default_threshold(config.default_score_threshold)
            .with_default_language(config.default_language())
            .with_default_entities(config.entities_to_detect.clone())
            .with_timeout(Duration::from_millis(config.recognizer_timeout_ms))
    }

    pub fn with_priorities(mut self, priorities: HashMap<EntityType, i32>) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_threshold(mut self, threshold: f32) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn with_default_language(mut self, language: Language) -> Self {
        self.default_language = language;
        self
    }

    pub fn with_default_entities(mut self, entities: Vec<EntityType>) -> Self {
        self.default_entities = entities;
        self
    }

    /// Deadline for all recognizer calls of one request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn registry(&self) -> &RecognizerRegistry {
        &self.registry
    }

    pub fn default_language(&self) -> &Language {
        &self.default_language
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Analyze text
    pub async fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<AnalysisOutcome> {
        let start = Instant::now();

        let threshold = request.score_threshold.unwrap_or(self.default_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::invalid_request(format!(
                "score_threshold {} is outside [0, 1]",
                threshold
            )));
        }

        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.default_language.clone());
        let correlation_id = request.correlation_id.as_deref().unwrap_or("-");

        let recognizers = self.registry.for_language(&language)?;
        let requested = self.requested_types(request);

        let applicable: Vec<(usize, Arc<dyn Recognizer>)> = recognizers
            .into_iter()
            .filter(|(_, r)| r.can_produce(&requested))
            .collect();

        let deadline = self.timeout.map(|t| tokio::time::Instant::now() + t);
        let text = request.text;

        let futures = applicable.iter().map(|(_, recognizer)| {
            let recognizer = Arc::clone(recognizer);
            let requested = &requested;
            let language = &language;
            async move {
                let call = recognizer.recognize(text, requested, language);
                match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, call)
                        .await
                        .unwrap_or(Err(Error::Timeout)),
                    None => call.await,
                }
            }
        });
        let results = join_all(futures).await;

        let text_len = text.chars().count();
        let mut candidates = Vec::new();
        let mut failures = Vec::new();
        let mut completed = 0usize;

        for ((index, recognizer), result) in applicable.iter().zip(results) {
            match result {
                Ok(spans) => {
                    completed += 1;
                    candidates.extend(
                        spans
                            .into_iter()
                            .filter(|span| self.accept_span(span, recognizer.as_ref(), &requested, text_len))
                            .map(|span| Candidate::new(with_source(span, recognizer.as_ref()), *index)),
                    );
                }
                Err(e) => {
                    warn!(
                        recognizer = %recognizer.name(),
                        recognizer_id = %recognizer.id(),
                        correlation_id,
                        error = %e,
                        "Recognizer failed, excluding its results"
                    );
                    failures.push(RecognizerFailure {
                        recognizer: recognizer.name().to_string(),
                        recognizer_id: recognizer.id().to_string(),
                        error: e.to_string(),
                        model_outage: e.is_model_outage(),
                        timed_out: matches!(e, Error::Timeout),
                    });
                }
            }
        }

        if completed == 0 && !failures.is_empty() {
            return Err(aggregate_failure(&failures));
        }

        let candidate_count = candidates.len();
        candidates.retain(|c| c.span.score >= threshold);

        let mut spans = resolve_overlaps(candidates, &self.priorities, &self.policy);
        if !request.return_decision_process {
            for span in &mut spans {
                span.explanation = None;
            }
        }

        let result = RecognitionResult::try_from_spans(spans)
            .map_err(|e| Error::internal(format!("overlap resolution produced invalid result: {}", e)))?;

        let latency_us = start.elapsed().as_micros() as u64;
        debug!(
            correlation_id,
            %language,
            recognizers = applicable.len(),
            failed = failures.len(),
            candidates = candidate_count,
            entities = result.len(),
            latency_us,
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            result,
            language,
            failures,
            latency_us,
        })
    }

    /// Requested types: request list, then configured defaults, else all
    fn requested_types(&self, request: &AnalysisRequest<'_>) -> HashSet<EntityType> {
        match &request.entities {
            Some(entities) if !entities.is_empty() => entities.iter().cloned().collect(),
            _ => self.default_entities.iter().cloned().collect(),
        }
    }

    fn accept_span(
        &self,
        span: &Span,
        recognizer: &dyn Recognizer,
        requested: &HashSet<EntityType>,
        text_len: usize,
    ) -> bool {
        if !span.is_within(text_len) {
            warn!(
                recognizer = %recognizer.name(),
                start = span.start,
                end = span.end,
                text_len,
                "Dropping span outside the text"
            );
            return false;
        }
        is_requested(requested, &span.entity_type)
    }
}

fn with_source(mut span: Span, recognizer: &dyn Recognizer) -> Span {
    if span.recognizer_id.is_empty() {
        span.recognizer_name = recognizer.name().to_string();
        span.recognizer_id = recognizer.id().to_string();
    }
    span
}

fn aggregate_failure(failures: &[RecognizerFailure]) -> Error {
    if failures.iter().all(|f| f.timed_out) {
        return Error::Timeout;
    }

    let summary = failures
        .iter()
        .map(|f| format!("{}: {}", f.recognizer, f.error))
        .collect::<Vec<_>>()
        .join("; ");

    Error::AllRecognizersFailed {
        count: failures.len(),
        summary,
        model_outage: failures.iter().all(|f| f.model_outage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Pattern, PatternRecognizer};
    use crate::validators::Validator;

    fn personal_code_registry() -> Arc<RecognizerRegistry> {
        let recognizer = PatternRecognizer::new(
            "EePersonalCodeRecognizer",
            EntityType::EE_PERSONAL_CODE,
            vec![Pattern::new("isikukood", r"\b[1-8][0-9]{10}\b", 0.5).unwrap()],
        )
        .with_validator(Validator::EePersonalCode);

        Arc::new(
            RecognizerRegistry::new()
                .with(Arc::new(recognizer))
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_analyze_personal_code() {
        let engine = AnalyzerEngine::new(personal_code_registry());
        let outcome = engine
            .analyze(&AnalysisRequest::new("Isikukood: 38001085718"))
            .await
            .unwrap();

        assert_eq!(outcome.result.len(), 1);
        let span = &outcome.result.spans()[0];
        assert_eq!((span.start, span.end), (11, 22));
        assert_eq!(span.score, 1.0);
        assert!(span.explanation.is_none());
        assert_eq!(outcome.language, Language::generic());
    }

    #[tokio::test]
    async fn test_decision_process_kept_on_request() {
        let engine = AnalyzerEngine::new(personal_code_registry());
        let request = AnalysisRequest::new("38001085718").with_decision_process(true);
        let outcome = engine.analyze(&request).await.unwrap();

        let explanation = outcome.result.spans()[0].explanation.as_ref().unwrap();
        assert_eq!(explanation.pattern_name.as_deref(), Some("isikukood"));
        assert_eq!(explanation.validation_result, Some(true));
    }

    #[tokio::test]
    async fn test_invalid_threshold_rejected() {
        let engine = AnalyzerEngine::new(personal_code_registry());
        let err = engine
            .analyze(&AnalysisRequest::new("x").with_score_threshold(1.5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let registry = RecognizerRegistry::new()
            .with(Arc::new(
                PatternRecognizer::new(
                    "p",
                    EntityType::PERSON,
                    vec![Pattern::new("p", "x", 0.5).unwrap()],
                )
                .with_languages(vec!["et".into()]),
            ))
            .unwrap();
        let engine = AnalyzerEngine::new(Arc::new(registry));

        let err = engine
            .analyze(&AnalysisRequest::new("x").with_language("de"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage(_)));
    }

    #[tokio::test]
    async fn test_empty_text() {
        let engine = AnalyzerEngine::new(personal_code_registry());
        let outcome = engine.analyze(&AnalysisRequest::new("")).await.unwrap();
        assert!(outcome.result.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_default_entities_restrict_types() {
        let engine = AnalyzerEngine::new(personal_code_registry())
            .with_default_entities(vec![EntityType::PERSON]);

        let outcome = engine
            .analyze(&AnalysisRequest::new("38001085718"))
            .await
            .unwrap();
        assert!(outcome.result.is_empty());

        // An explicit list overrides the defaults, an empty one does not
        let outcome = engine
            .analyze(&AnalysisRequest::new("38001085718").with_entities(vec![EntityType::EE_PERSONAL_CODE]))
            .await
            .unwrap();
        assert_eq!(outcome.result.len(), 1);

        let outcome = engine
            .analyze(&AnalysisRequest::new("38001085718").with_entities(Vec::new()))
            .await
            .unwrap();
        assert!(outcome.result.is_empty());
    }

    #[test]
    fn test_aggregate_failure_kinds() {
        let failure = |model_outage, timed_out| RecognizerFailure {
            recognizer: "r".to_string(),
            recognizer_id: "model:r".to_string(),
            error: "boom".to_string(),
            model_outage,
            timed_out,
        };

        assert!(matches!(
            aggregate_failure(&[failure(false, true)]),
            Error::Timeout
        ));
        assert!(matches!(
            aggregate_failure(&[failure(true, false), failure(true, false)]),
            Error::AllRecognizersFailed { model_outage: true, count: 2, .. }
        ));
        assert!(matches!(
            aggregate_failure(&[failure(true, false), failure(false, true)]),
            Error::AllRecognizersFailed { model_outage: false, .. }
        ));
    }
}
