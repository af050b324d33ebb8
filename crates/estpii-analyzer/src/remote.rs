//! Tagger backed by a model-serving sidecar over HTTP
//!
//! Wire contract:
//!
//! ```text
//! POST <endpoint>  {"text": "...", "language": "xx", "model": "xx_ent_wiki_sm"}
//! 200              {"entities": [{"start": 0, "end": 4, "label": "PER", "score": 0.93}]}
//! ```
//!
//! Offsets in the response are char offsets into `text`.

use crate::model::{TaggedEntity, Tagger};
use async_trait::async_trait;
use estpii_core::{Error, Language, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    text: &'a str,
    language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TagResponse {
    #[serde(default)]
    entities: Vec<TaggedEntity>,
}

/// JSON-over-HTTP tagger
pub struct RemoteTagger {
    client: reqwest::Client,
    endpoint: String,
    engine_name: String,
    /// Model to request per language; falls back to the generic entry
    models: HashMap<Language, String>,
}

impl RemoteTagger {
    /// Create a new remote tagger with a per-call timeout
    pub fn new(
        endpoint: impl Into<String>,
        engine_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            engine_name: engine_name.into(),
            models: HashMap::new(),
        })
    }

    /// Set the model requested for a language
    pub fn with_model(mut self, language: Language, model: impl Into<String>) -> Self {
        self.models.insert(language, model.into());
        self
    }

    fn model_for(&self, language: &Language) -> Option<&str> {
        self.models
            .get(language)
            .or_else(|| self.models.get(&Language::generic()))
            .map(String::as_str)
    }

    /// Check the sidecar answers a tagging request
    pub async fn probe(&self) -> Result<()> {
        self.tag("", &Language::generic()).await.map(|_| ())
    }
}

#[async_trait]
impl Tagger for RemoteTagger {
    async fn tag(&self, text: &str, language: &Language) -> Result<Vec<TaggedEntity>> {
        let request = TagRequest {
            text,
            language: language.as_str(),
            model: self.model_for(language),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::model_unavailable(format!("{} unreachable at {}: {}", self.engine_name, self.endpoint, e))
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(Error::model_unavailable(format!(
                "{} returned {}",
                self.engine_name, status
            )));
        }
        if !status.is_success() {
            return Err(Error::recognizer(
                &self.engine_name,
                format!("sidecar rejected request: {}", status),
            ));
        }

        let body: TagResponse = response.json().await.map_err(|e| {
            Error::recognizer(&self.engine_name, format!("invalid sidecar response: {}", e))
        })?;

        Ok(body.entities)
    }

    fn model_name(&self) -> &str {
        &self.engine_name
    }
}
