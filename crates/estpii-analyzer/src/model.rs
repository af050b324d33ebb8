//! Model recognizer
//!
//! Wraps a statistical tagger and maps its native labels (`PER`, `B-LOC`, ...)
//! onto the entity-type vocabulary.

use crate::recognizer::{is_requested, recognizer_id, Recognizer, RecognizerKind};
use async_trait::async_trait;
use estpii_core::{AnalysisExplanation, EntityType, Language, Result, Span};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Raw entity produced by a tagger, in char offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedEntity {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f32,
}

/// A statistical entity tagger
///
/// Implementations may run in-process (Candle) or call out to a sidecar.
/// Unreachable or unloaded models must surface as `Error::ModelUnavailable`.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Tag entities in the text
    async fn tag(&self, text: &str, language: &Language) -> Result<Vec<TaggedEntity>>;

    /// Model identifier, for diagnostics
    fn model_name(&self) -> &str;
}

/// Strip an IOB/BIOES prefix from a label
pub fn strip_iob_prefix(label: &str) -> &str {
    match label.split_once('-') {
        Some((prefix, rest)) if matches!(prefix, "B" | "I" | "E" | "S" | "L" | "U") => rest,
        _ => label,
    }
}

/// Recognizer that delegates to a [`Tagger`]
pub struct ModelRecognizer {
    name: String,
    id: String,
    tagger: Arc<dyn Tagger>,
    label_mapping: HashMap<String, EntityType>,
    entities: Vec<EntityType>,
    languages: Vec<Language>,
}

impl ModelRecognizer {
    /// Create a new model recognizer
    pub fn new(
        name: impl Into<String>,
        tagger: Arc<dyn Tagger>,
        label_mapping: HashMap<String, EntityType>,
        languages: Vec<Language>,
    ) -> Self {
        let name = name.into();
        let mut entities: Vec<EntityType> = label_mapping.values().cloned().collect();
        entities.sort();
        entities.dedup();

        Self {
            id: recognizer_id(RecognizerKind::Model, &name),
            name,
            tagger,
            label_mapping,
            entities,
            languages,
        }
    }

    fn map_label(&self, label: &str) -> Option<&EntityType> {
        self.label_mapping
            .get(label)
            .or_else(|| self.label_mapping.get(strip_iob_prefix(label)))
    }
}

#[async_trait]
impl Recognizer for ModelRecognizer {
    async fn recognize(
        &self,
        text: &str,
        requested: &HashSet<EntityType>,
        language: &Language,
    ) -> Result<Vec<Span>> {
        let tagged = self.tagger.tag(text, language).await?;
        let text_len = text.chars().count();

        let mut spans: Vec<Span> = tagged
            .into_iter()
            .filter_map(|entity| {
                let Some(entity_type) = self.map_label(&entity.label) else {
                    tracing::trace!(
                        recognizer = %self.name,
                        label = %entity.label,
                        "Dropping unmapped label"
                    );
                    return None;
                };

                if !is_requested(requested, entity_type) {
                    return None;
                }

                if entity.start >= entity.end || entity.end > text_len {
                    tracing::warn!(
                        recognizer = %self.name,
                        start = entity.start,
                        end = entity.end,
                        text_len,
                        "Tagger returned span outside the text"
                    );
                    return None;
                }

                let score = entity.score.clamp(0.0, 1.0);
                let explanation = AnalysisExplanation {
                    recognizer: self.name.clone(),
                    original_score: score,
                    score,
                    textual_explanation: Some(format!(
                        "Identified as {} by {}",
                        entity.label,
                        self.tagger.model_name()
                    )),
                    ..Default::default()
                };

                Some(
                    Span::new(entity.start, entity.end, entity_type.clone(), score)
                        .with_source(&self.name, &self.id)
                        .with_explanation(explanation),
                )
            })
            .collect();

        spans.sort_by(|a, b| a.position_cmp(b));
        Ok(spans)
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
        RecognizerKind::Model
    }
}
