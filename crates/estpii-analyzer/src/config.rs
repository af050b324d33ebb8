//! Analyzer configuration
//!
//! Loaded once from YAML at startup. Only the analysis-related sections are
//! read here; unknown top-level keys (such as `anonymization_config`) are
//! ignored.

use crate::deny_list::DenyListRecognizer;
use crate::overlap::ConflictPolicy;
use crate::pattern::{ContextEnhancer, InvalidMatchPolicy, Pattern, PatternRecognizer};
use crate::recognizer::Recognizer;
use crate::validators::Validator;
use estpii_core::{EntityType, Error, Language, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Languages requests may ask for (`xx` is the generic multilingual set)
    pub supported_languages: Vec<Language>,

    /// Language used when a request names none
    #[serde(default)]
    pub default_language: Option<Language>,

    /// Minimum score kept in results
    #[serde(default)]
    pub default_score_threshold: f32,

    /// Entity types analyzed when a request names none (empty = all)
    #[serde(default)]
    pub entities_to_detect: Vec<EntityType>,

    /// Register the built-in pattern recognizers
    #[serde(default = "default_true")]
    pub builtin_recognizers: bool,

    /// Overlap tie-breaker order
    #[serde(default)]
    pub conflict_resolution: ConflictPolicy,

    /// Per-request recognizer deadline
    #[serde(default = "default_recognizer_timeout_ms")]
    pub recognizer_timeout_ms: u64,

    /// Estonian BERT tagger
    #[serde(default)]
    pub estbert_configuration: Option<EstBertConfig>,

    /// Generic multilingual tagger
    #[serde(default)]
    pub nlp_configuration: Option<NlpConfig>,

    /// Recognizers defined in configuration
    #[serde(default)]
    pub custom_recognizers: Vec<RecognizerSpec>,

    /// Per-entity-type settings
    #[serde(default)]
    pub entity_types: HashMap<EntityType, EntityTypeSettings>,
}

fn default_true() -> bool {
    true
}

fn default_recognizer_timeout_ms() -> u64 {
    10_000
}

/// Settings for one entity type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTypeSettings {
    /// Overlap-resolution weight; higher wins, missing means 0
    #[serde(default)]
    pub priority: i32,
}

/// Device specification for in-process models
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda {
        #[serde(default)]
        index: usize,
    },
    Metal {
        #[serde(default)]
        index: usize,
    },
}

/// EstBERT tagger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstBertConfig {
    /// Hugging Face model id (also reported by `/config`)
    #[serde(default = "default_estbert_model")]
    pub model_name: String,

    /// Load from a local directory instead of the hub
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Hub revision
    #[serde(default)]
    pub revision: Option<String>,

    /// Hub download cache
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub device: DeviceSpec,

    /// Longest text slice sent through the model at once
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Serve the model from a sidecar instead of in-process
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,

    /// Native label to entity type
    #[serde(default = "default_estbert_labels")]
    pub label_mapping: HashMap<String, EntityType>,

    /// Languages to register for (empty = all supported languages)
    #[serde(default)]
    pub supported_languages: Vec<Language>,
}

fn default_estbert_model() -> String {
    "tartuNLP/EstBERT_NER".to_string()
}

fn default_max_chunk_chars() -> usize {
    1000
}

fn default_model_timeout_ms() -> u64 {
    5_000
}

fn default_estbert_labels() -> HashMap<String, EntityType> {
    HashMap::from([
        ("PER".to_string(), EntityType::PERSON),
        ("ORG".to_string(), EntityType::ORGANIZATION),
        ("LOC".to_string(), EntityType::LOCATION),
    ])
}

/// Generic multilingual tagger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpConfig {
    /// Engine name (also reported by `/config`)
    pub nlp_engine_name: String,

    /// Model per language
    #[serde(default)]
    pub models: Vec<NlpModel>,

    /// Sidecar URL; without it the tagger is not registered
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_model_timeout_ms")]
    pub timeout_ms: u64,

    /// Fail startup when the sidecar does not answer
    #[serde(default = "default_true")]
    pub probe_on_startup: bool,

    /// Native label to entity type
    #[serde(default = "default_nlp_labels")]
    pub label_mapping: HashMap<String, EntityType>,
}

/// Model served for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlpModel {
    pub lang_code: Language,
    pub model_name: String,
}

fn default_nlp_labels() -> HashMap<String, EntityType> {
    HashMap::from([
        ("PER".to_string(), EntityType::PERSON),
        ("PERSON".to_string(), EntityType::PERSON),
        ("LOC".to_string(), EntityType::LOCATION),
        ("GPE".to_string(), EntityType::LOCATION),
        ("ORG".to_string(), EntityType::ORGANIZATION),
    ])
}

/// A recognizer defined in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerSpec {
    pub name: String,

    pub supported_entity: EntityType,

    #[serde(flatten)]
    pub kind: RecognizerSpecKind,

    /// Single language shorthand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_language: Option<Language>,

    /// Languages to register for (empty = all supported languages)
    #[serde(default)]
    pub supported_languages: Vec<Language>,

    /// Words that raise the score when they precede a match
    #[serde(default)]
    pub context: Vec<String>,
}

/// Recognizer family and its parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognizerSpecKind {
    Pattern {
        patterns: Vec<PatternSpec>,
        #[serde(default)]
        validator: Option<Validator>,
        #[serde(default)]
        on_invalid: InvalidMatchPolicy,
    },
    DenyList {
        deny_list: Vec<String>,
        #[serde(default = "default_deny_list_score")]
        score: f32,
    },
}

fn default_deny_list_score() -> f32 {
    1.0
}

impl RecognizerSpecKind {
    /// Name reported by `/config`
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Pattern { .. } => "pattern",
            Self::DenyList { .. } => "deny_list",
        }
    }
}

/// One regular expression of a pattern recognizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub name: String,
    pub regex: String,
    pub score: f32,
}

impl RecognizerSpec {
    /// Languages this recognizer should be registered for
    pub fn languages(&self, all: &[Language]) -> Vec<Language> {
        let mut languages: Vec<Language> = self
            .supported_language
            .iter()
            .chain(self.supported_languages.iter())
            .cloned()
            .collect();
        if languages.is_empty() {
            languages = all.to_vec();
        }
        languages.sort();
        languages.dedup();
        languages
    }

    /// Build the recognizer
    pub fn build(&self, all_languages: &[Language]) -> Result<Arc<dyn Recognizer>> {
        let languages = self.languages(all_languages);

        let recognizer: Arc<dyn Recognizer> = match &self.kind {
            RecognizerSpecKind::Pattern {
                patterns,
                validator,
                on_invalid,
            } => {
                if patterns.is_empty() {
                    return Err(Error::config(format!(
                        "recognizer '{}' has no patterns",
                        self.name
                    )));
                }

                let compiled = patterns
                    .iter()
                    .map(|p| Pattern::new(&p.name, &p.regex, p.score))
                    .collect::<Result<Vec<_>>>()?;

                let mut recognizer =
                    PatternRecognizer::new(&self.name, self.supported_entity.clone(), compiled)
                        .with_invalid_policy(*on_invalid)
                        .with_languages(languages);
                if let Some(validator) = validator {
                    recognizer = recognizer.with_validator(*validator);
                }
                if !self.context.is_empty() {
                    recognizer = recognizer.with_context(ContextEnhancer::new(self.context.clone()));
                }
                Arc::new(recognizer)
            }
            RecognizerSpecKind::DenyList { deny_list, score } => {
                if !(0.0..=1.0).contains(score) {
                    return Err(Error::config(format!(
                        "recognizer '{}' score {} is outside [0, 1]",
                        self.name, score
                    )));
                }
                Arc::new(
                    DenyListRecognizer::new(
                        &self.name,
                        self.supported_entity.clone(),
                        deny_list,
                        *score,
                    )?
                    .with_languages(languages),
                )
            }
        };

        Ok(recognizer)
    }
}

impl AnalyzerConfig {
    /// Minimal configuration for the given languages
    pub fn new(supported_languages: Vec<Language>) -> Self {
        Self {
            supported_languages,
            default_language: None,
            default_score_threshold: 0.0,
            entities_to_detect: Vec::new(),
            builtin_recognizers: true,
            conflict_resolution: ConflictPolicy::default(),
            recognizer_timeout_ms: default_recognizer_timeout_ms(),
            estbert_configuration: None,
            nlp_configuration: None,
            custom_recognizers: Vec::new(),
            entity_types: HashMap::new(),
        }
    }

    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("failed to parse analyzer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Language used when a request names none
    ///
    /// Falls back to the generic set when supported, else the first language.
    pub fn default_language(&self) -> Language {
        if let Some(language) = &self.default_language {
            return language.clone();
        }
        let generic = Language::generic();
        if self.supported_languages.contains(&generic) || self.supported_languages.is_empty() {
            generic
        } else {
            self.supported_languages[0].clone()
        }
    }

    /// Entity-type priority weights
    pub fn priorities(&self) -> HashMap<EntityType, i32> {
        self.entity_types
            .iter()
            .map(|(entity, settings)| (entity.clone(), settings.priority))
            .collect()
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.supported_languages.is_empty() {
            return Err(Error::config("supported_languages must not be empty"));
        }

        let known: HashSet<&Language> = self.supported_languages.iter().collect();
        let check_language = |language: &Language, owner: &str| -> Result<()> {
            if known.contains(language) {
                Ok(())
            } else {
                Err(Error::config(format!(
                    "{} uses language '{}' which is not in supported_languages",
                    owner, language
                )))
            }
        };

        if let Some(language) = &self.default_language {
            check_language(language, "default_language")?;
        }

        if !(0.0..=1.0).contains(&self.default_score_threshold) {
            return Err(Error::config(format!(
                "default_score_threshold {} is outside [0, 1]",
                self.default_score_threshold
            )));
        }

        if self.recognizer_timeout_ms == 0 {
            return Err(Error::config("recognizer_timeout_ms must be positive"));
        }

        let mut seen_breakers = HashSet::new();
        for breaker in self.conflict_resolution.order() {
            if !seen_breakers.insert(breaker) {
                return Err(Error::config(format!(
                    "conflict_resolution lists {:?} twice",
                    breaker
                )));
            }
        }

        if let Some(estbert) = &self.estbert_configuration {
            if estbert.max_chunk_chars == 0 {
                return Err(Error::config("estbert max_chunk_chars must be positive"));
            }
            for language in &estbert.supported_languages {
                check_language(language, "estbert_configuration")?;
            }
        }

        if let Some(nlp) = &self.nlp_configuration {
            for model in &nlp.models {
                check_language(&model.lang_code, "nlp_configuration")?;
            }
        }

        let mut names = HashSet::new();
        for spec in &self.custom_recognizers {
            if !names.insert(spec.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate custom recognizer name '{}'",
                    spec.name
                )));
            }
            for language in spec.languages(&self.supported_languages) {
                check_language(&language, &format!("recognizer '{}'", spec.name))?;
            }
            // Compiles regexes and checks scores
            spec.build(&self.supported_languages)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
supported_languages: [et, xx]
default_language: xx
default_score_threshold: 0.35
entities_to_detect: [PERSON, LOCATION, EE_PERSONAL_CODE]
conflict_resolution: [priority, score, length, registration_order]
estbert_configuration:
  model_name: tartuNLP/EstBERT_NER
  device: cpu
nlp_configuration:
  nlp_engine_name: spacy
  models:
    - lang_code: xx
      model_name: xx_ent_wiki_sm
custom_recognizers:
  - name: EstonianVehiclePlate
    type: pattern
    supported_entity: EE_VEHICLE_PLATE
    supported_language: et
    patterns:
      - name: plate
        regex: '\b[0-9]{3} ?[A-Z]{3}\b'
        score: 0.4
    context: [auto, numbrimärk]
  - name: Titles
    type: deny_list
    supported_entity: TITLE
    deny_list: [härra, proua]
entity_types:
  EE_PERSONAL_CODE:
    priority: 10
anonymization_config:
  default_operators:
    PERSON: "<ISIK>"
"#;

    #[test]
    fn test_parse_sample() {
        let config = AnalyzerConfig::from_yaml(SAMPLE).unwrap();

        assert_eq!(config.supported_languages.len(), 2);
        assert!((config.default_score_threshold - 0.35).abs() < 1e-6);
        assert_eq!(config.entities_to_detect[2], EntityType::EE_PERSONAL_CODE);
        assert_eq!(
            config.estbert_configuration.as_ref().unwrap().label_mapping["PER"],
            EntityType::PERSON
        );
        assert!(config.nlp_configuration.as_ref().unwrap().endpoint.is_none());
        assert_eq!(config.custom_recognizers.len(), 2);
        assert_eq!(config.custom_recognizers[1].kind.type_name(), "deny_list");
        assert_eq!(config.priorities()[&EntityType::EE_PERSONAL_CODE], 10);
    }

    #[test]
    fn test_recognizer_languages_default_to_all() {
        let config = AnalyzerConfig::from_yaml(SAMPLE).unwrap();
        let all = &config.supported_languages;

        assert_eq!(config.custom_recognizers[0].languages(all), vec![Language::from("et")]);
        assert_eq!(config.custom_recognizers[1].languages(all).len(), 2);
    }

    #[tokio::test]
    async fn test_built_spec_recognizes() {
        let config = AnalyzerConfig::from_yaml(SAMPLE).unwrap();
        let recognizer = config.custom_recognizers[0]
            .build(&config.supported_languages)
            .unwrap();

        let spans = recognizer
            .recognize("Auto 123 ABC", &HashSet::new(), &Language::from("et"))
            .await
            .unwrap();
        assert_eq!(spans.len(), 1);
        assert!((spans[0].score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_missing_languages_rejected() {
        let err = AnalyzerConfig::from_yaml("default_score_threshold: 0.5").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = AnalyzerConfig::from_yaml("supported_languages: []").unwrap_err();
        assert!(err.to_string().contains("supported_languages"));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let yaml = r#"
supported_languages: [xx]
custom_recognizers:
  - name: Broken
    type: pattern
    supported_entity: X
    patterns:
      - name: broken
        regex: '(unclosed'
        score: 0.5
"#;
        let err = AnalyzerConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn test_unknown_validator_rejected() {
        let yaml = r#"
supported_languages: [xx]
custom_recognizers:
  - name: Card
    type: pattern
    supported_entity: CREDIT_CARD
    validator: mod_13
    patterns:
      - name: card
        regex: '[0-9]{16}'
        score: 0.5
"#;
        assert!(AnalyzerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unsupported_recognizer_language_rejected() {
        let yaml = r#"
supported_languages: [xx]
custom_recognizers:
  - name: Plate
    type: pattern
    supported_entity: EE_VEHICLE_PLATE
    supported_language: et
    patterns:
      - name: plate
        regex: '[0-9]{3}[A-Z]{3}'
        score: 0.5
"#;
        let err = AnalyzerConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("'et'"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let yaml = "supported_languages: [xx]\ndefault_score_threshold: 1.5";
        assert!(AnalyzerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = AnalyzerConfig::from_file(&path).unwrap();
        assert_eq!(config.default_language(), Language::generic());

        assert!(AnalyzerConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
