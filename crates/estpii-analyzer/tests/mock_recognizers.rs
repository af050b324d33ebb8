//! Mock recognizers for testing
//!
//! Configurable implementations of the Recognizer trait used to exercise
//! the analysis engine: overlap resolution, thresholds, failure isolation
//! and deadlines.

use async_trait::async_trait;
use estpii_analyzer::{
    AnalysisRequest, AnalyzerEngine, ConflictPolicy, Recognizer, RecognizerKind,
    RecognizerRegistry, TieBreaker,
};
use estpii_core::{EntityType, Error, Language, Result, Span};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A recognizer that returns a fixed set of spans
pub struct MockRecognizer {
    name: String,
    id: String,
    spans: Vec<Span>,
    entities: Vec<EntityType>,
    languages: Vec<Language>,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockRecognizer {
    /// Create a new mock recognizer with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: format!("mock:{}", name),
            spans: Vec::new(),
            entities: Vec::new(),
            languages: Vec::new(),
            simulated_latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Add a span this recognizer will return
    pub fn with_span(mut self, start: usize, end: usize, entity: EntityType, score: f32) -> Self {
        if !self.entities.contains(&entity) {
            self.entities.push(entity.clone());
        }
        self.spans.push(Span::new(start, end, entity, score));
        self
    }

    /// Register for specific languages
    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| Language::from(*l)).collect();
        self
    }

    /// Set simulated latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    /// Number of times recognize was called
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn recognize(
        &self,
        _text: &str,
        requested: &HashSet<EntityType>,
        _language: &Language,
    ) -> Result<Vec<Span>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        Ok(self
            .spans
            .iter()
            .filter(|s| requested.is_empty() || requested.contains(&s.entity_type))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn supported_entities(&self) -> &[EntityType] {
        &self.entities
    }

    fn supported_languages(&self) -> &[Language] {
        &self.languages
    }

    fn kind(&self) -> RecognizerKind {
        RecognizerKind::Pattern
    }
}

/// A recognizer that always fails - for testing error paths
pub struct FailingRecognizer {
    name: String,
    id: String,
    model_outage: bool,
    entities: Vec<EntityType>,
}

impl FailingRecognizer {
    /// Create a new failing recognizer
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            id: format!("failing:{}", name),
            model_outage: false,
            entities: vec![EntityType::PERSON],
        }
    }

    /// Fail with `ModelUnavailable` instead of a recognizer error
    pub fn as_model_outage(mut self) -> Self {
        self.model_outage = true;
        self
    }
}

#[async_trait]
impl Recognizer for FailingRecognizer {
    async fn recognize(
        &self,
        _text: &str,
        _requested: &HashSet<EntityType>,
        _language: &Language,
    ) -> Result<Vec<Span>> {
        if self.model_outage {
            Err(Error::model_unavailable("simulated outage"))
        } else {
            Err(Error::recognizer(&self.name, "simulated recognizer failure"))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn supported_entities(&self) -> &[EntityType] {
        &self.entities
    }

    fn supported_languages(&self) -> &[Language] {
        &[]
    }

    fn kind(&self) -> RecognizerKind {
        RecognizerKind::Model
    }
}

fn engine(recognizers: Vec<Arc<dyn Recognizer>>) -> AnalyzerEngine {
    let mut registry = RecognizerRegistry::new();
    for recognizer in recognizers {
        registry.register(recognizer).unwrap();
    }
    AnalyzerEngine::new(Arc::new(registry))
}

const SENTENCE: &str = "Minu nimi on Jaan Tamm ja ma elan Tallinnas.";

#[tokio::test]
async fn test_person_and_location_detected() {
    let model = MockRecognizer::new("estbert")
        .with_span(13, 22, EntityType::PERSON, 0.99)
        .with_span(34, 43, EntityType::LOCATION, 0.97);
    let engine = engine(vec![Arc::new(model)]);

    let outcome = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap();
    let found: Vec<_> = outcome
        .result
        .iter()
        .map(|s| (s.entity_type.as_str(), s.start, s.end))
        .collect();

    assert_eq!(found, vec![("PERSON", 13, 22), ("LOCATION", 34, 43)]);
    assert_eq!(outcome.result.spans()[0].recognizer_id, "mock:estbert");
}

#[tokio::test]
async fn test_one_failing_recognizer_does_not_fail_request() {
    let model = MockRecognizer::new("estbert").with_span(13, 22, EntityType::PERSON, 0.9);
    let engine = engine(vec![
        Arc::new(FailingRecognizer::new("broken")),
        Arc::new(model),
    ]);

    let outcome = engine
        .analyze(&AnalysisRequest::new(SENTENCE).with_correlation_id("req-1"))
        .await
        .unwrap();

    assert_eq!(outcome.result.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].recognizer, "broken");
}

#[tokio::test]
async fn test_all_failing_is_aggregate_error() {
    let engine = engine(vec![
        Arc::new(FailingRecognizer::new("a")),
        Arc::new(FailingRecognizer::new("b").as_model_outage()),
    ]);

    let err = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::AllRecognizersFailed { count: 2, model_outage: false, .. }
    ));
}

#[tokio::test]
async fn test_all_model_outages_flagged() {
    let engine = engine(vec![Arc::new(FailingRecognizer::new("a").as_model_outage())]);

    let err = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap_err();
    assert!(matches!(err, Error::AllRecognizersFailed { model_outage: true, .. }));
}

#[tokio::test]
async fn test_slow_recognizer_times_out() {
    let slow = MockRecognizer::new("slow")
        .with_span(0, 4, EntityType::PERSON, 0.9)
        .with_latency(Duration::from_millis(500));
    let fast = MockRecognizer::new("fast").with_span(34, 43, EntityType::LOCATION, 0.9);

    let engine = engine(vec![Arc::new(slow), Arc::new(fast)])
        .with_timeout(Duration::from_millis(50));

    let outcome = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap();
    assert_eq!(outcome.result.len(), 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].timed_out);
}

#[tokio::test]
async fn test_nothing_completes_is_timeout() {
    let slow = MockRecognizer::new("slow")
        .with_span(0, 4, EntityType::PERSON, 0.9)
        .with_latency(Duration::from_millis(500));
    let engine = engine(vec![Arc::new(slow)]).with_timeout(Duration::from_millis(20));

    let err = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn test_threshold_keeps_equal_scores() {
    let model = MockRecognizer::new("m")
        .with_span(0, 4, EntityType::PERSON, 0.5)
        .with_span(5, 9, EntityType::PERSON, 0.49)
        .with_span(13, 17, EntityType::PERSON, 0.51);
    let engine = engine(vec![Arc::new(model)]);

    let outcome = engine
        .analyze(&AnalysisRequest::new(SENTENCE).with_score_threshold(0.5))
        .await
        .unwrap();
    let starts: Vec<_> = outcome.result.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![0, 13]);
}

#[tokio::test]
async fn test_default_threshold_applies() {
    let model = MockRecognizer::new("m").with_span(0, 4, EntityType::PERSON, 0.3);
    let engine = engine(vec![Arc::new(model)]).with_default_threshold(0.4);

    let outcome = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap();
    assert!(outcome.result.is_empty());

    // Explicit zero threshold overrides the default
    let outcome = engine
        .analyze(&AnalysisRequest::new(SENTENCE).with_score_threshold(0.0))
        .await
        .unwrap();
    assert_eq!(outcome.result.len(), 1);
}

#[tokio::test]
async fn test_priority_retains_higher_priority_type() {
    let text = "Kood 38001085718";
    let phone = MockRecognizer::new("phone").with_span(5, 16, EntityType::PHONE_NUMBER, 0.9);
    let code = MockRecognizer::new("code").with_span(5, 16, EntityType::EE_PERSONAL_CODE, 0.6);

    let engine = engine(vec![Arc::new(phone), Arc::new(code)])
        .with_priorities(HashMap::from([(EntityType::EE_PERSONAL_CODE, 10)]));

    let outcome = engine.analyze(&AnalysisRequest::new(text)).await.unwrap();
    assert_eq!(outcome.result.len(), 1);
    assert_eq!(outcome.result.spans()[0].entity_type, EntityType::EE_PERSONAL_CODE);
}

#[tokio::test]
async fn test_score_first_policy() {
    let phone = MockRecognizer::new("phone").with_span(5, 16, EntityType::PHONE_NUMBER, 0.9);
    let code = MockRecognizer::new("code").with_span(5, 16, EntityType::EE_PERSONAL_CODE, 0.6);

    let engine = engine(vec![Arc::new(phone), Arc::new(code)])
        .with_priorities(HashMap::from([(EntityType::EE_PERSONAL_CODE, 10)]))
        .with_conflict_policy(ConflictPolicy::new(vec![TieBreaker::Score, TieBreaker::Priority]));

    let outcome = engine
        .analyze(&AnalysisRequest::new("Kood 38001085718"))
        .await
        .unwrap();
    assert_eq!(outcome.result.spans()[0].entity_type, EntityType::PHONE_NUMBER);
}

#[tokio::test]
async fn test_registration_order_decides_full_tie() {
    let first = MockRecognizer::new("first").with_span(13, 22, EntityType::PERSON, 0.8);
    let second = MockRecognizer::new("second").with_span(13, 22, EntityType::ORGANIZATION, 0.8);
    let engine = engine(vec![Arc::new(first), Arc::new(second)]);

    for _ in 0..5 {
        let outcome = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap();
        assert_eq!(outcome.result.spans()[0].recognizer_id, "mock:first");
    }
}

#[tokio::test]
async fn test_out_of_range_span_dropped() {
    let model = MockRecognizer::new("m")
        .with_span(40, 80, EntityType::PERSON, 0.9)
        .with_span(0, 4, EntityType::PERSON, 0.9);
    let engine = engine(vec![Arc::new(model)]);

    let outcome = engine.analyze(&AnalysisRequest::new(SENTENCE)).await.unwrap();
    assert_eq!(outcome.result.len(), 1);
    assert_eq!(outcome.result.spans()[0].start, 0);
}

#[tokio::test]
async fn test_language_specific_set_used() {
    let et = Arc::new(MockRecognizer::new("et").with_languages(&["et"]).with_span(
        0,
        4,
        EntityType::PERSON,
        0.9,
    ));
    let generic = Arc::new(MockRecognizer::new("generic").with_span(5, 9, EntityType::PERSON, 0.9));
    let engine = engine(vec![et.clone(), generic.clone()]);

    engine
        .analyze(&AnalysisRequest::new(SENTENCE).with_language("et"))
        .await
        .unwrap();
    assert_eq!(et.call_count(), 1);
    assert_eq!(generic.call_count(), 0);

    engine
        .analyze(&AnalysisRequest::new(SENTENCE).with_language("fi"))
        .await
        .unwrap();
    assert_eq!(generic.call_count(), 1);
}

#[tokio::test]
async fn test_recognizers_not_producing_requested_types_skipped() {
    let person = Arc::new(MockRecognizer::new("person").with_span(0, 4, EntityType::PERSON, 0.9));
    let location =
        Arc::new(MockRecognizer::new("location").with_span(34, 43, EntityType::LOCATION, 0.9));
    let engine = engine(vec![person.clone(), location.clone()]);

    let outcome = engine
        .analyze(&AnalysisRequest::new(SENTENCE).with_entities(vec![EntityType::LOCATION]))
        .await
        .unwrap();

    assert_eq!(outcome.result.len(), 1);
    assert_eq!(person.call_count(), 0);
    assert_eq!(location.call_count(), 1);
}
