//! Pattern-based recognizer
//!
//! Runs one or more regular expressions over the text. Matches can be
//! checked by a [`Validator`]; a failed check either rejects the match or
//! caps its score, depending on the configured [`InvalidMatchPolicy`].
//! Unvalidated matches may be boosted by nearby context words.

use crate::recognizer::{is_requested, recognizer_id, Recognizer, RecognizerKind};
use crate::validators::Validator;
use async_trait::async_trait;
use estpii_core::{AnalysisExplanation, EntityType, Error, Language, Result, Span, TextIndex};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Score assigned to matches that pass validation
const VALIDATED_SCORE: f32 = 1.0;

/// Matches scored between yields to the runtime
const MATCHES_PER_YIELD: usize = 256;

/// A named regular expression with a base score
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub regex: Regex,
    pub score: f32,
}

impl Pattern {
    /// Compile a pattern
    pub fn new(name: impl Into<String>, regex: &str, score: f32) -> Result<Self> {
        let name = name.into();
        let regex = Regex::new(regex)
            .map_err(|e| Error::config(format!("invalid regex for pattern '{}': {}", name, e)))?;

        if !(0.0..=1.0).contains(&score) {
            return Err(Error::config(format!(
                "pattern '{}' score {} is outside [0, 1]",
                name, score
            )));
        }

        Ok(Self { name, regex, score })
    }
}

/// What to do with a match that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum InvalidMatchPolicy {
    /// Drop the match
    #[default]
    Reject,
    /// Keep the match with its score capped at `score`
    Downgrade { score: f32 },
}

/// Raises the score of a match when a context word precedes it
#[derive(Debug, Clone)]
pub struct ContextEnhancer {
    words: Vec<String>,
    window: usize,
    similarity_factor: f32,
    min_score_with_context: f32,
}

impl ContextEnhancer {
    /// Create an enhancer with default window (5 words), factor 0.35 and floor 0.4
    pub fn new(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            words: words.into_iter().map(|w| w.into().to_lowercase()).collect(),
            window: 5,
            similarity_factor: 0.35,
            min_score_with_context: 0.4,
        }
    }

    /// Number of words before the match to search
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Score added when a context word is found
    pub fn with_similarity_factor(mut self, factor: f32) -> Self {
        self.similarity_factor = factor;
        self
    }

    /// Minimum score once context is found
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score_with_context = min_score;
        self
    }

    /// Find a context word among the last words of `preceding`
    pub fn find_support(&self, preceding: &str) -> Option<&str> {
        if self.words.is_empty() || self.window == 0 {
            return None;
        }

        // Walk back from the match so cost depends on the window, not the text
        preceding
            .rsplit(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .take(self.window)
            .find_map(|token| {
                let token = token.to_lowercase();
                self.words
                    .iter()
                    .find(|word| token.starts_with(word.as_str()))
                    .map(String::as_str)
            })
    }

    /// Apply the boost to a score
    pub fn boost(&self, score: f32) -> f32 {
        (score + self.similarity_factor)
            .max(self.min_score_with_context)
            .min(1.0)
    }
}

/// Recognizer built from regular expressions
pub struct PatternRecognizer {
    name: String,
    id: String,
    entities: Vec<EntityType>,
    languages: Vec<Language>,
    patterns: Vec<Pattern>,
    validator: Option<Validator>,
    invalid_policy: InvalidMatchPolicy,
    context: Option<ContextEnhancer>,
}

impl PatternRecognizer {
    /// Create a new pattern recognizer for one entity type
    pub fn new(name: impl Into<String>, entity_type: EntityType, patterns: Vec<Pattern>) -> Self {
        let name = name.into();
        Self {
            id: recognizer_id(RecognizerKind::Pattern, &name),
            name,
            entities: vec![entity_type],
            languages: Vec::new(),
            patterns,
            validator: None,
            invalid_policy: InvalidMatchPolicy::default(),
            context: None,
        }
    }

    /// Attach a validator
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the policy for matches that fail validation
    pub fn with_invalid_policy(mut self, policy: InvalidMatchPolicy) -> Self {
        self.invalid_policy = policy;
        self
    }

    /// Attach context words
    pub fn with_context(mut self, context: ContextEnhancer) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the languages this recognizer is registered for
    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }

    fn entity_type(&self) -> &EntityType {
        &self.entities[0]
    }

    /// Score one match, or `None` if it is rejected
    fn score_match(
        &self,
        pattern: &Pattern,
        matched: &str,
        preceding: &str,
    ) -> Option<(f32, AnalysisExplanation)> {
        let mut explanation = AnalysisExplanation {
            recognizer: self.name.clone(),
            pattern_name: Some(pattern.name.clone()),
            pattern: Some(pattern.regex.as_str().to_string()),
            original_score: pattern.score,
            score: pattern.score,
            ..Default::default()
        };

        let mut score = pattern.score;

        if let Some(validator) = self.validator {
            let valid = validator.validate(matched);
            explanation.validation_result = Some(valid);

            if valid {
                explanation.score = VALIDATED_SCORE;
                return Some((VALIDATED_SCORE, explanation));
            }

            match self.invalid_policy {
                InvalidMatchPolicy::Reject => return None,
                InvalidMatchPolicy::Downgrade { score: cap } => {
                    let downgraded = score.min(cap);
                    explanation.score = downgraded;
                    explanation.textual_explanation =
                        Some(format!("{} check failed", validator.name()));
                    return Some((downgraded, explanation));
                }
            }
        }

        if let Some(context) = &self.context {
            if let Some(word) = context.find_support(preceding) {
                let boosted = context.boost(score);
                explanation.score_context_improvement = boosted - score;
                explanation.supportive_context_word = Some(word.to_string());
                score = boosted;
            }
        }

        explanation.score = score;
        Some((score, explanation))
    }
}

#[async_trait]
impl Recognizer for PatternRecognizer {
    async fn recognize(
        &self,
        text: &str,
        requested: &HashSet<EntityType>,
        _language: &Language,
    ) -> Result<Vec<Span>> {
        if !is_requested(requested, self.entity_type()) {
            return Ok(Vec::new());
        }

        let index = TextIndex::new(text);
        let mut spans: Vec<Span> = Vec::new();
        let mut by_range: HashMap<(usize, usize), usize> = HashMap::new();
        let mut scored = 0usize;

        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(text) {
                if m.is_empty() {
                    continue;
                }

                // Let the request deadline interrupt long texts
                scored += 1;
                if scored % MATCHES_PER_YIELD == 0 {
                    tokio::task::yield_now().await;
                }

                let Some((start, end)) = index.char_range(m.start(), m.end()) else {
                    continue;
                };

                let Some((score, explanation)) =
                    self.score_match(pattern, m.as_str(), &text[..m.start()])
                else {
                    tracing::trace!(
                        recognizer = %self.name,
                        start,
                        end,
                        "Match rejected by validator"
                    );
                    continue;
                };

                // Several patterns may hit the same range; keep the best score
                if let Some(&position) = by_range.get(&(start, end)) {
                    let existing = &mut spans[position];
                    if score > existing.score {
                        existing.score = score;
                        existing.explanation = Some(explanation);
                    }
                    continue;
                }

                by_range.insert((start, end), spans.len());
                spans.push(
                    Span::new(start, end, self.entity_type().clone(), score)
                        .with_source(&self.name, &self.id)
                        .with_explanation(explanation),
                );
            }
        }

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
        RecognizerKind::Pattern
    }
}
