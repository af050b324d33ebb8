//! Core types for estpii

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};

/// Category label for detected PII (e.g. `PERSON`, `EE_PERSONAL_CODE`)
///
/// The vocabulary is open: configuration may introduce new types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    pub const PERSON: EntityType = EntityType(Cow::Borrowed("PERSON"));
    pub const LOCATION: EntityType = EntityType(Cow::Borrowed("LOCATION"));
    pub const ORGANIZATION: EntityType = EntityType(Cow::Borrowed("ORGANIZATION"));
    pub const EE_PERSONAL_CODE: EntityType = EntityType(Cow::Borrowed("EE_PERSONAL_CODE"));
    pub const EE_VEHICLE_PLATE: EntityType = EntityType(Cow::Borrowed("EE_VEHICLE_PLATE"));
    pub const PHONE_NUMBER: EntityType = EntityType(Cow::Borrowed("PHONE_NUMBER"));
    pub const EMAIL_ADDRESS: EntityType = EntityType(Cow::Borrowed("EMAIL_ADDRESS"));
    pub const IBAN_CODE: EntityType = EntityType(Cow::Borrowed("IBAN_CODE"));
    pub const CREDIT_CARD: EntityType = EntityType(Cow::Borrowed("CREDIT_CARD"));
    pub const IP_ADDRESS: EntityType = EntityType(Cow::Borrowed("IP_ADDRESS"));
    pub const URL: EntityType = EntityType(Cow::Borrowed("URL"));
    pub const DATE_TIME: EntityType = EntityType(Cow::Borrowed("DATE_TIME"));

    /// Create an entity type from any name
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Get the type name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Language identifier (ISO code, or `xx` for the multilingual set)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    /// Identifier of the generic multilingual recognizer set
    pub const GENERIC: &'static str = "xx";

    /// Create a language identifier
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The generic multilingual language
    pub fn generic() -> Self {
        Self::new(Self::GENERIC)
    }

    /// Whether this is the generic multilingual language
    pub fn is_generic(&self) -> bool {
        self.0 == Self::GENERIC
    }

    /// Get the language code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Language {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Explanation of how a span was detected and scored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisExplanation {
    /// Recognizer that produced the span
    pub recognizer: String,

    /// Name of the matching pattern (pattern recognizers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_name: Option<String>,

    /// Matching regular expression (pattern recognizers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Score before validation and context adjustments
    pub original_score: f32,

    /// Final score
    pub score: f32,

    /// Validator verdict, if a validator ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_result: Option<bool>,

    /// Score added by a supporting context word
    pub score_context_improvement: f32,

    /// The context word that raised the score
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supportive_context_word: Option<String>,

    /// Free-form explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textual_explanation: Option<String>,
}

/// A contiguous character range tagged with an entity type and confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start (char offset)
    pub start: usize,

    /// Exclusive end (char offset)
    pub end: usize,

    /// Detected entity type
    pub entity_type: EntityType,

    /// Confidence score (0.0-1.0)
    pub score: f32,

    /// Name of the recognizer that produced this span
    pub recognizer_name: String,

    /// Unique identifier of the recognizer instance
    pub recognizer_id: String,

    /// Decision-process details, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<AnalysisExplanation>,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize, entity_type: EntityType, score: f32) -> Self {
        Self {
            start,
            end,
            entity_type,
            score,
            recognizer_name: String::new(),
            recognizer_id: String::new(),
            explanation: None,
        }
    }

    /// Attach the producing recognizer
    pub fn with_source(mut self, name: impl Into<String>, id: impl Into<String>) -> Self {
        self.recognizer_name = name.into();
        self.recognizer_id = id.into();
        self
    }

    /// Attach a decision-process explanation
    pub fn with_explanation(mut self, explanation: AnalysisExplanation) -> Self {
        self.explanation = Some(explanation);
        self
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no characters
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether the two ranges intersect
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether the span lies within a text of `text_len` chars
    pub fn is_within(&self, text_len: usize) -> bool {
        self.start < self.end && self.end <= text_len
    }

    /// Output order: `start` ascending, longer span first
    pub fn position_cmp(&self, other: &Span) -> std::cmp::Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| other.end.cmp(&self.end))
    }
}

/// Overlap-free, position-ordered set of spans
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RecognitionResult {
    spans: Vec<Span>,
}

impl RecognitionResult {
    /// An empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from spans, sorting them and rejecting overlaps
    pub fn try_from_spans(mut spans: Vec<Span>) -> Result<Self> {
        spans.sort_by(|a, b| a.position_cmp(b));

        for span in &spans {
            if span.is_empty() {
                return Err(Error::invalid_request(format!(
                    "empty span [{}, {}) for {}",
                    span.start, span.end, span.entity_type
                )));
            }
        }

        for pair in spans.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(Error::invalid_request(format!(
                    "overlapping spans [{}, {}) and [{}, {})",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }

        Ok(Self { spans })
    }

    /// Check every span fits inside a text of `text_len` chars
    pub fn check_bounds(&self, text_len: usize) -> Result<()> {
        match self.spans.iter().find(|s| !s.is_within(text_len)) {
            Some(span) => Err(Error::invalid_request(format!(
                "span [{}, {}) exceeds text length {}",
                span.start, span.end, text_len
            ))),
            None => Ok(()),
        }
    }

    /// Get the spans in position order
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Iterate over spans in position order
    pub fn iter(&self) -> std::slice::Iter<'_, Span> {
        self.spans.iter()
    }

    /// Number of spans
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the result contains no spans
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Consume into the span list
    pub fn into_spans(self) -> Vec<Span> {
        self.spans
    }
}

impl<'a> IntoIterator for &'a RecognitionResult {
    type Item = &'a Span;
    type IntoIter = std::slice::Iter<'a, Span>;

    fn into_iter(self) -> Self::IntoIter {
        self.spans.iter()
    }
}
