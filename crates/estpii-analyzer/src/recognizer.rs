//! Recognizer trait and common types

use async_trait::async_trait;
use estpii_core::{EntityType, Language, Result, Span};
use serde::Serialize;
use std::collections::HashSet;

/// Trait for all recognizers
///
/// A recognizer returns candidate spans, sorted by `start`, restricted to
/// `requested` when that set is non-empty. An empty set means every type the
/// recognizer supports. Offsets are char offsets into `text`.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Find candidate spans in the given text
    async fn recognize(
        &self,
        text: &str,
        requested: &HashSet<EntityType>,
        language: &Language,
    ) -> Result<Vec<Span>>;

    /// Get the recognizer name
    fn name(&self) -> &str;

    /// Unique identifier of this instance
    fn id(&self) -> &str;

    /// Entity types this recognizer can produce
    fn supported_entities(&self) -> &[EntityType];

    /// Languages this recognizer is registered for
    fn supported_languages(&self) -> &[Language];

    /// Recognizer family
    fn kind(&self) -> RecognizerKind;

    /// Whether any of the requested types can come from this recognizer
    fn can_produce(&self, requested: &HashSet<EntityType>) -> bool {
        requested.is_empty()
            || self
                .supported_entities()
                .iter()
                .any(|entity| requested.contains(entity))
    }

    /// Identifying metadata
    fn info(&self) -> RecognizerInfo {
        RecognizerInfo {
            name: self.name().to_string(),
            id: self.id().to_string(),
            kind: self.kind(),
            supported_entities: self.supported_entities().to_vec(),
            supported_languages: self.supported_languages().to_vec(),
        }
    }
}

/// Recognizer family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    /// Regular expressions with optional validation
    Pattern,
    /// Literal term list
    DenyList,
    /// Statistical tagger
    Model,
}

impl RecognizerKind {
    /// Short name used in recognizer identifiers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::DenyList => "deny_list",
            Self::Model => "model",
        }
    }
}

/// Identifying metadata for a registered recognizer
#[derive(Debug, Clone, Serialize)]
pub struct RecognizerInfo {
    pub name: String,
    pub id: String,
    pub kind: RecognizerKind,
    pub supported_entities: Vec<EntityType>,
    pub supported_languages: Vec<Language>,
}

/// Whether `entity` passes the requested-type filter
pub fn is_requested(requested: &HashSet<EntityType>, entity: &EntityType) -> bool {
    requested.is_empty() || requested.contains(entity)
}

/// Build a deterministic recognizer id from its kind and name
pub fn recognizer_id(kind: RecognizerKind, name: &str) -> String {
    format!("{}:{}", kind.as_str(), name)
}
