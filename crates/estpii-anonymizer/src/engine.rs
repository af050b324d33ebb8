//! Anonymization engine
//!
//! Rewrites text in a single left-to-right pass over an overlap-free
//! `RecognitionResult`, reporting where each replacement landed in the
//! output.

use crate::operator::{Operator, OperatorSetting};
use estpii_core::{EntityType, Error, RecognitionResult, Result, TextIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Operator-map key that applies to every entity type
pub const DEFAULT_OPERATOR_KEY: &str = "DEFAULT";

/// Process-wide anonymization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizationConfig {
    /// Default operator per entity type (`DEFAULT` replaces the fallback)
    #[serde(default)]
    pub default_operators: BTreeMap<String, OperatorSetting>,

    /// Operator for types without any configured operator
    #[serde(default)]
    pub fallback_operator: Operator,

    /// Replacement used when an operator fails on a span
    #[serde(default = "default_failure_replacement")]
    pub failure_replacement: String,
}

fn default_failure_replacement() -> String {
    "[REDACTED]".to_string()
}

impl Default for AnonymizationConfig {
    fn default() -> Self {
        Self {
            default_operators: BTreeMap::new(),
            fallback_operator: Operator::default(),
            failure_replacement: default_failure_replacement(),
        }
    }
}

impl AnonymizationConfig {
    /// Check every configured operator
    pub fn validate(&self) -> Result<()> {
        for (entity, setting) in &self.default_operators {
            setting.to_operator().validate().map_err(|e| {
                Error::config(format!("anonymization operator for {}: {}", entity, e))
            })?;
        }
        self.fallback_operator
            .validate()
            .map_err(|e| Error::config(format!("fallback_operator: {}", e)))
    }
}

/// One rewritten span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnonymizedItem {
    /// Source start (char offset in the original text)
    pub start: usize,

    /// Source end (char offset in the original text)
    pub end: usize,

    /// Start in the anonymized text
    pub output_start: usize,

    /// End in the anonymized text
    pub output_end: usize,

    pub entity_type: EntityType,

    /// Replacement text
    pub text: String,

    /// Name of the operator that produced the replacement
    pub operator: String,
}

/// Rewritten text and the applied items in position order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnonymizationResult {
    pub text: String,
    pub items: Vec<AnonymizedItem>,
}

/// Anonymization engine
pub struct AnonymizerEngine {
    defaults: HashMap<String, Operator>,
    fallback: Operator,
    failure_replacement: String,
}

impl Default for AnonymizerEngine {
    fn default() -> Self {
        Self::new(&AnonymizationConfig::default())
    }
}

impl AnonymizerEngine {
    /// Create an engine from configuration
    pub fn new(config: &AnonymizationConfig) -> Self {
        let mut defaults: HashMap<String, Operator> = config
            .default_operators
            .iter()
            .map(|(entity, setting)| (entity.clone(), setting.to_operator()))
            .collect();

        let fallback = defaults
            .remove(DEFAULT_OPERATOR_KEY)
            .unwrap_or_else(|| config.fallback_operator.clone());

        Self {
            defaults,
            fallback,
            failure_replacement: config.failure_replacement.clone(),
        }
    }

    /// Operator for an entity type
    ///
    /// Precedence: request override for the type, configured default for
    /// the type, request `DEFAULT`, configured fallback.
    pub fn resolve_operator<'a>(
        &'a self,
        entity_type: &EntityType,
        overrides: &'a HashMap<String, Operator>,
    ) -> &'a Operator {
        overrides
            .get(entity_type.as_str())
            .or_else(|| self.defaults.get(entity_type.as_str()))
            .or_else(|| overrides.get(DEFAULT_OPERATOR_KEY))
            .unwrap_or(&self.fallback)
    }

    /// Check request operators before any text is analyzed
    pub fn validate_overrides(overrides: &HashMap<String, Operator>) -> Result<()> {
        for (entity, operator) in overrides {
            operator.validate().map_err(|e| {
                Error::invalid_request(format!("invalid operator for {}: {}", entity, e))
            })?;
        }
        Ok(())
    }

    /// Rewrite `text`, replacing every span of `result`
    ///
    /// Fails only if a span lies outside the text. Operator failures are
    /// recovered per span with the failure replacement.
    pub fn anonymize(
        &self,
        text: &str,
        result: &RecognitionResult,
        overrides: &HashMap<String, Operator>,
    ) -> Result<AnonymizationResult> {
        let index = TextIndex::new(text);
        result.check_bounds(index.char_len())?;

        let mut output = String::with_capacity(text.len());
        let mut items = Vec::with_capacity(result.len());
        let mut cursor = 0usize;
        let mut delta = 0isize;

        for span in result {
            let (from, to) = match (index.byte_offset(span.start), index.byte_offset(span.end)) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    return Err(Error::invalid_request(format!(
                        "span [{}, {}) is not on a character boundary",
                        span.start, span.end
                    )))
                }
            };

            let original = &text[from..to];
            let operator = self.resolve_operator(&span.entity_type, overrides);

            let replacement = match operator.apply(original, &span.entity_type) {
                Ok(replacement) => replacement,
                Err(e) => {
                    warn!(
                        entity_type = %span.entity_type,
                        operator = operator.name(),
                        start = span.start,
                        error = %e,
                        "Operator failed, using failure replacement"
                    );
                    self.failure_replacement.clone()
                }
            };

            output.push_str(&text[cursor..from]);
            output.push_str(&replacement);
            cursor = to;

            let replacement_len = replacement.chars().count();
            let output_start = offset(span.start, delta);
            let output_end = output_start + replacement_len;
            delta += replacement_len as isize - span.len() as isize;

            items.push(AnonymizedItem {
                start: span.start,
                end: span.end,
                output_start,
                output_end,
                entity_type: span.entity_type.clone(),
                text: replacement,
                operator: operator.name().to_string(),
            });
        }

        output.push_str(&text[cursor..]);

        debug!(items = items.len(), "Anonymization complete");

        Ok(AnonymizationResult {
            text: output,
            items,
        })
    }
}

fn offset(position: usize, delta: isize) -> usize {
    position.saturating_add_signed(delta)
}
