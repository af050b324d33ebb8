//! Deny-list recognizer using Aho-Corasick

use crate::recognizer::{is_requested, recognizer_id, Recognizer, RecognizerKind};
use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use estpii_core::{AnalysisExplanation, EntityType, Error, Language, Result, Span, TextIndex};
use std::collections::HashSet;

/// Flags every whole-word occurrence of a fixed term list
pub struct DenyListRecognizer {
    name: String,
    id: String,
    entities: Vec<EntityType>,
    languages: Vec<Language>,
    terms: AhoCorasick,
    score: f32,
}

impl DenyListRecognizer {
    /// Create a new deny-list recognizer
    ///
    /// Terms and text are compared after Unicode lowercasing.
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        terms: &[String],
        score: f32,
    ) -> Result<Self> {
        let name = name.into();
        if terms.is_empty() {
            return Err(Error::config(format!("deny list '{}' has no terms", name)));
        }
        if terms.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::config(format!("deny list '{}' has a blank term", name)));
        }

        let folded: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        let automaton = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&folded)
            .map_err(|e| Error::config(format!("failed to build deny list '{}': {}", name, e)))?;

        Ok(Self {
            id: recognizer_id(RecognizerKind::DenyList, &name),
            name,
            entities: vec![entity_type],
            languages: Vec::new(),
            terms: automaton,
            score,
        })
    }

    /// Set the languages this recognizer is registered for
    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }
}

/// Lowercased copy of a text that remembers where each byte came from
struct FoldedText {
    folded: String,
    /// Original byte offset of the char that produced each folded byte,
    /// followed by the original text length
    origin: Vec<usize>,
}

impl FoldedText {
    fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len() + 1);

        for (offset, c) in text.char_indices() {
            for lower in c.to_lowercase() {
                folded.push(lower);
                origin.resize(folded.len(), offset);
            }
        }
        origin.push(text.len());

        Self { folded, origin }
    }

    /// Map a folded byte range back to the text, unless it splits a char's lowercase form
    fn original_range(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        let starts_char = start == 0 || self.origin[start] != self.origin[start - 1];
        let ends_char = end == self.folded.len() || self.origin[end] != self.origin[end - 1];
        (starts_char && ends_char).then(|| (self.origin[start], self.origin[end]))
    }
}

/// Keep the longest candidate at each position, dropping anything it covers
fn remove_overlapping(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    ranges.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

    let mut kept = Vec::with_capacity(ranges.len());
    let mut last_end = 0;
    for (start, end) in ranges {
        if start >= last_end {
            last_end = end;
            kept.push((start, end));
        }
    }
    kept
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

#[async_trait]
impl Recognizer for DenyListRecognizer {
    async fn recognize(
        &self,
        text: &str,
        requested: &HashSet<EntityType>,
        _language: &Language,
    ) -> Result<Vec<Span>> {
        if !is_requested(requested, &self.entities[0]) {
            return Ok(Vec::new());
        }

        let folded = FoldedText::new(text);
        // A longer term that fails the word check must not hide a shorter one
        let candidates: Vec<(usize, usize)> = self
            .terms
            .find_overlapping_iter(&folded.folded)
            .filter_map(|m| folded.original_range(m.start(), m.end()))
            .filter(|&(start, end)| is_word_boundary(text, start, end))
            .collect();

        let index = TextIndex::new(text);
        let spans = remove_overlapping(candidates)
            .into_iter()
            .filter_map(|(start, end)| {
                let (start, end) = index.char_range(start, end)?;
                let explanation = AnalysisExplanation {
                    recognizer: self.name.clone(),
                    original_score: self.score,
                    score: self.score,
                    textual_explanation: Some("deny list term".to_string()),
                    ..Default::default()
                };
                Some(
                    Span::new(start, end, self.entities[0].clone(), self.score)
                        .with_source(&self.name, &self.id)
                        .with_explanation(explanation),
                )
            })
            .collect();

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
        RecognizerKind::DenyList
    }
}
