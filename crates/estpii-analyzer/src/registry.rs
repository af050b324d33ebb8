//! Recognizer registry initialization and lookup

use crate::builtin::builtin_specs;
use crate::config::{AnalyzerConfig, EstBertConfig, NlpConfig};
use crate::model::{ModelRecognizer, Tagger};
use crate::recognizer::{Recognizer, RecognizerInfo};
use crate::remote::RemoteTagger;
use estpii_core::{EntityType, Error, Language, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Recognizers per language, in registration order
///
/// The registration index of a recognizer is its position in the global
/// list and is the last tie-breaker during overlap resolution.
#[derive(Default)]
pub struct RecognizerRegistry {
    recognizers: Vec<Arc<dyn Recognizer>>,
    by_language: HashMap<Language, Vec<usize>>,
}

impl RecognizerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recognizer for its supported languages
    ///
    /// A recognizer without languages is registered for the generic set.
    pub fn register(&mut self, recognizer: Arc<dyn Recognizer>) -> Result<()> {
        if self.recognizers.iter().any(|r| r.id() == recognizer.id()) {
            return Err(Error::config(format!(
                "recognizer id '{}' registered twice",
                recognizer.id()
            )));
        }

        let index = self.recognizers.len();
        let languages = if recognizer.supported_languages().is_empty() {
            vec![Language::generic()]
        } else {
            recognizer.supported_languages().to_vec()
        };

        for language in languages {
            self.by_language.entry(language).or_default().push(index);
        }

        info!(
            recognizer = %recognizer.name(),
            id = %recognizer.id(),
            index,
            "Registered recognizer"
        );
        self.recognizers.push(recognizer);
        Ok(())
    }

    /// Builder-style registration
    pub fn with(mut self, recognizer: Arc<dyn Recognizer>) -> Result<Self> {
        self.register(recognizer)?;
        Ok(self)
    }

    /// Recognizers for a language, with their registration index
    ///
    /// Falls back to the generic set when the language has none.
    pub fn for_language(&self, language: &Language) -> Result<Vec<(usize, Arc<dyn Recognizer>)>> {
        let indices = self
            .by_language
            .get(language)
            .filter(|indices| !indices.is_empty())
            .or_else(|| {
                self.by_language
                    .get(&Language::generic())
                    .filter(|indices| !indices.is_empty())
            })
            .ok_or_else(|| Error::UnsupportedLanguage(language.to_string()))?;

        Ok(indices
            .iter()
            .map(|&i| (i, Arc::clone(&self.recognizers[i])))
            .collect())
    }

    /// Entity types detectable for a language, sorted
    pub fn supported_entities(&self, language: &Language) -> Result<Vec<EntityType>> {
        let entities: BTreeSet<EntityType> = self
            .for_language(language)?
            .iter()
            .flat_map(|(_, r)| r.supported_entities().to_vec())
            .collect();
        Ok(entities.into_iter().collect())
    }

    /// Metadata of the recognizers for a language
    pub fn recognizer_infos(&self, language: &Language) -> Result<Vec<RecognizerInfo>> {
        Ok(self
            .for_language(language)?
            .iter()
            .map(|(_, r)| r.info())
            .collect())
    }

    /// Languages with at least one recognizer
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.by_language.keys().cloned().collect();
        languages.sort();
        languages
    }

    /// Number of registered recognizers
    pub fn count(&self) -> usize {
        self.recognizers.len()
    }

    /// Build the registry described by the configuration
    ///
    /// Registration order: generic NLP tagger, built-in patterns, EstBERT,
    /// custom recognizers. Model load failures are returned as
    /// `Error::ModelUnavailable` and should stop startup.
    pub async fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let mut registry = Self::new();
        let all_languages = &config.supported_languages;

        match &config.nlp_configuration {
            Some(nlp) => {
                if let Some(recognizer) = nlp_recognizer(nlp).await? {
                    registry.register(recognizer)?;
                }
            }
            None => info!("No nlp_configuration, generic tagger not registered"),
        }

        if config.builtin_recognizers {
            for spec in builtin_specs() {
                registry.register(spec.build(all_languages)?)?;
            }
        }

        match &config.estbert_configuration {
            Some(estbert) => {
                registry.register(estbert_recognizer(estbert, all_languages).await?)?;
            }
            None => info!("No estbert_configuration, EstBERT not registered"),
        }

        for spec in &config.custom_recognizers {
            registry.register(spec.build(all_languages)?)?;
        }

        for language in all_languages {
            if !registry.by_language.contains_key(language) {
                warn!(%language, "Supported language has no recognizers, generic set will be used");
            }
        }

        info!(
            recognizers = registry.count(),
            languages = ?registry.languages(),
            "Recognizer registry ready"
        );

        Ok(registry)
    }
}

async fn nlp_recognizer(nlp: &NlpConfig) -> Result<Option<Arc<dyn Recognizer>>> {
    let Some(endpoint) = &nlp.endpoint else {
        warn!(
            engine = %nlp.nlp_engine_name,
            "nlp_configuration has no endpoint, generic tagger not registered"
        );
        return Ok(None);
    };

    let mut tagger = RemoteTagger::new(
        endpoint.clone(),
        nlp.nlp_engine_name.clone(),
        Duration::from_millis(nlp.timeout_ms),
    )?;
    for model in &nlp.models {
        tagger = tagger.with_model(model.lang_code.clone(), model.model_name.clone());
    }

    if nlp.probe_on_startup {
        tagger.probe().await?;
        info!(engine = %nlp.nlp_engine_name, %endpoint, "NLP sidecar reachable");
    }

    let mut languages: Vec<Language> = nlp.models.iter().map(|m| m.lang_code.clone()).collect();
    languages.sort();
    languages.dedup();

    Ok(Some(Arc::new(ModelRecognizer::new(
        format!("{}NerRecognizer", nlp.nlp_engine_name),
        Arc::new(tagger),
        nlp.label_mapping.clone(),
        languages,
    ))))
}

async fn estbert_recognizer(
    estbert: &EstBertConfig,
    all_languages: &[Language],
) -> Result<Arc<dyn Recognizer>> {
    let tagger: Arc<dyn Tagger> = match &estbert.endpoint {
        Some(endpoint) => {
            let tagger = RemoteTagger::new(
                endpoint.clone(),
                estbert.model_name.clone(),
                Duration::from_millis(estbert.timeout_ms),
            )?;
            tagger.probe().await?;
            Arc::new(tagger)
        }
        None => load_bert(estbert).await?,
    };

    let languages: Vec<Language> = if estbert.supported_languages.is_empty() {
        all_languages.to_vec()
    } else {
        let unique: HashSet<Language> = estbert.supported_languages.iter().cloned().collect();
        let mut languages: Vec<Language> = unique.into_iter().collect();
        languages.sort();
        languages
    };

    Ok(Arc::new(ModelRecognizer::new(
        "EstBERT_NER_Recognizer",
        tagger,
        estbert.label_mapping.clone(),
        languages,
    )))
}

#[cfg(feature = "ml-models")]
async fn load_bert(estbert: &EstBertConfig) -> Result<Arc<dyn Tagger>> {
    let config = estbert.clone();
    let tagger = tokio::task::spawn_blocking(move || crate::bert::BertTokenTagger::load(&config))
        .await
        .map_err(|e| Error::internal(format!("model loading task failed: {}", e)))??;
    Ok(Arc::new(tagger))
}

#[cfg(not(feature = "ml-models"))]
async fn load_bert(estbert: &EstBertConfig) -> Result<Arc<dyn Tagger>> {
    Err(Error::model_unavailable(format!(
        "'{}' needs the ml-models feature or an endpoint",
        estbert.model_name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Pattern, PatternRecognizer};

    fn pattern(name: &str, entity: EntityType, languages: Vec<Language>) -> Arc<dyn Recognizer> {
        Arc::new(
            PatternRecognizer::new(name, entity, vec![Pattern::new("p", "x", 0.5).unwrap()])
                .with_languages(languages),
        )
    }

    #[test]
    fn test_language_lookup_and_generic_fallback() {
        let mut registry = RecognizerRegistry::new();
        registry
            .register(pattern("et_only", EntityType::EE_PERSONAL_CODE, vec!["et".into()]))
            .unwrap();
        registry
            .register(pattern("generic", EntityType::EMAIL_ADDRESS, Vec::new()))
            .unwrap();

        let et = registry.for_language(&"et".into()).unwrap();
        assert_eq!(et.len(), 1);
        assert_eq!(et[0].0, 0);

        // No Finnish set, generic recognizers used instead
        let fi = registry.for_language(&"fi".into()).unwrap();
        assert_eq!(fi.len(), 1);
        assert_eq!(fi[0].1.name(), "generic");
        assert_eq!(fi[0].0, 1);
    }

    #[test]
    fn test_unsupported_language_without_generic() {
        let registry = RecognizerRegistry::new()
            .with(pattern("et_only", EntityType::PERSON, vec!["et".into()]))
            .unwrap();

        let err = registry.for_language(&"de".into()).err().unwrap();
        assert!(matches!(err, Error::UnsupportedLanguage(ref lang) if lang == "de"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = RecognizerRegistry::new()
            .with(pattern("same", EntityType::PERSON, Vec::new()))
            .unwrap();
        assert!(registry.with(pattern("same", EntityType::PERSON, Vec::new())).is_err());
    }

    #[test]
    fn test_supported_entities_sorted_unique() {
        let registry = RecognizerRegistry::new()
            .with(pattern("a", EntityType::PERSON, Vec::new()))
            .unwrap()
            .with(pattern("b", EntityType::EMAIL_ADDRESS, Vec::new()))
            .unwrap()
            .with(pattern("c", EntityType::PERSON, Vec::new()))
            .unwrap();

        let entities = registry.supported_entities(&Language::generic()).unwrap();
        assert_eq!(entities, vec![EntityType::EMAIL_ADDRESS, EntityType::PERSON]);
    }

    #[tokio::test]
    async fn test_from_config_builtins_and_custom() {
        let config = AnalyzerConfig::from_yaml(
            r#"
supported_languages: [et, xx]
custom_recognizers:
  - name: Titles
    type: deny_list
    supported_entity: TITLE
    supported_language: et
    deny_list: [härra]
"#,
        )
        .unwrap();

        let registry = RecognizerRegistry::from_config(&config).await.unwrap();
        let builtin_count = builtin_specs().len();

        assert_eq!(registry.count(), builtin_count + 1);
        assert_eq!(registry.for_language(&"et".into()).unwrap().len(), builtin_count + 1);
        assert_eq!(registry.for_language(&"xx".into()).unwrap().len(), builtin_count);

        let infos = registry.recognizer_infos(&"et".into()).unwrap();
        assert_eq!(infos[0].id, "pattern:EePersonalCodeRecognizer");
        assert_eq!(infos.last().unwrap().id, "deny_list:Titles");
    }

    #[tokio::test]
    async fn test_from_config_without_builtins() {
        let mut config = AnalyzerConfig::new(vec![Language::generic()]);
        config.builtin_recognizers = false;

        let registry = RecognizerRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.count(), 0);
        assert!(registry.for_language(&Language::generic()).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_fails_startup() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = AnalyzerConfig::from_yaml(&format!(
            r#"
supported_languages: [xx]
nlp_configuration:
  nlp_engine_name: spacy
  endpoint: http://{}/tag
  timeout_ms: 500
  models:
    - lang_code: xx
      model_name: xx_ent_wiki_sm
"#,
            addr
        ))
        .unwrap();

        let err = RecognizerRegistry::from_config(&config).await.err().unwrap();
        assert!(err.is_model_outage());
    }
}
