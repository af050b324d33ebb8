//! Shared application state

use crate::config::ServiceConfig;
use estpii_analyzer::{AnalyzerEngine, RecognizerRegistry};
use estpii_anonymizer::AnonymizerEngine;
use estpii_core::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

/// Read-only state shared by every request
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServiceConfig>,

    /// Analysis engine with its recognizer registry
    pub analyzer: Arc<AnalyzerEngine>,

    pub anonymizer: Arc<AnonymizerEngine>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the registry (loading models) and both engines
    ///
    /// Model load failures surface as `Error::ModelUnavailable`.
    pub async fn new(config: ServiceConfig, metrics_handle: Option<PrometheusHandle>) -> Result<Self> {
        let registry = RecognizerRegistry::from_config(&config.analyzer).await?;
        info!(
            recognizers = registry.count(),
            languages = ?registry.languages(),
            "Recognizer registry ready"
        );
        Ok(Self::from_parts(config, registry, metrics_handle))
    }

    /// Assemble state around an already built registry
    pub fn from_parts(
        config: ServiceConfig,
        registry: RecognizerRegistry,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let analyzer = AnalyzerEngine::from_config(Arc::new(registry), &config.analyzer);
        let anonymizer = AnonymizerEngine::new(&config.anonymization_config);

        Self {
            config: Arc::new(config),
            analyzer: Arc::new(analyzer),
            anonymizer: Arc::new(anonymizer),
            metrics_handle,
        }
    }
}
