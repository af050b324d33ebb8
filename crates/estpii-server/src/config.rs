//! Service configuration

use estpii_analyzer::AnalyzerConfig;
use estpii_anonymizer::AnonymizationConfig;
use estpii_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete service configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Analysis sections (languages, recognizers, models, priorities)
    #[serde(flatten)]
    pub analyzer: AnalyzerConfig,

    #[serde(default)]
    pub anonymization_config: AnonymizationConfig,
}

impl ServiceConfig {
    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.analyzer.validate()?;
        self.anonymization_config.validate()
    }

    /// Short description of the configured models for the status endpoint
    pub fn model_summary(&self) -> String {
        let mut models = Vec::new();
        if let Some(estbert) = &self.analyzer.estbert_configuration {
            models.push(estbert.model_name.clone());
        }
        if let Some(nlp) = &self.analyzer.nlp_configuration {
            models.push(nlp.nlp_engine_name.clone());
        }
        if self.analyzer.builtin_recognizers || !self.analyzer.custom_recognizers.is_empty() {
            models.push("patterns".to_string());
        }
        models.join(" + ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estpii_anonymizer::Operator;
    use std::io::Write;

    const CONFIG: &str = r#"
supported_languages: [et, xx]
default_score_threshold: 0.4
estbert_configuration:
  model_name: tartuNLP/EstBERT_NER
nlp_configuration:
  nlp_engine_name: spacy
anonymization_config:
  default_operators:
    PERSON: "[ISIK]"
    LOCATION: "[ASUKOHT]"
  failure_replacement: "<PII>"
"#;

    #[test]
    fn test_load_sections() {
        let config = ServiceConfig::from_yaml(CONFIG).unwrap();

        assert_eq!(config.analyzer.supported_languages.len(), 2);
        assert_eq!(
            config.anonymization_config.default_operators["PERSON"].to_operator(),
            Operator::replace("[ISIK]")
        );
        assert_eq!(config.anonymization_config.failure_replacement, "<PII>");
        assert_eq!(config.model_summary(), "tartuNLP/EstBERT_NER + spacy + patterns");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let config = ServiceConfig::load(file.path()).unwrap();
        assert!((config.analyzer.default_score_threshold - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_operator_rejected() {
        let yaml = r#"
supported_languages: [et]
anonymization_config:
  fallback_operator:
    type: mask
    masking_char: ""
"#;
        assert!(matches!(ServiceConfig::from_yaml(yaml), Err(Error::Config(_))));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/presidio-estbert.yaml");
        let config = ServiceConfig::load(path).unwrap();

        assert_eq!(config.analyzer.default_language().as_str(), "xx");
        assert_eq!(
            config.anonymization_config.default_operators["TITLE"].to_operator(),
            Operator::Keep
        );
        assert!(config.analyzer.nlp_configuration.unwrap().endpoint.is_none());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServiceConfig::load("/nonexistent/estpii.yaml"),
            Err(Error::Config(_))
        ));
    }
}
