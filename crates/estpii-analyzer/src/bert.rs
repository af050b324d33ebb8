//! BERT token-classification tagger (EstBERT)
//!
//! Token predictions are aggregated into entities with the "simple"
//! strategy: consecutive tokens sharing an entity label form one entity,
//! a `B-` label or an `O` breaks the run, and the entity score is the mean
//! of its token scores.
//!
//! Model inference requires the `ml-models` feature.

use crate::model::{strip_iob_prefix, TaggedEntity};

/// Label prediction for one token, in char offsets
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPrediction {
    pub start: usize,
    pub end: usize,
    pub label: String,
    pub score: f32,
}

/// Group token predictions into entities
pub fn aggregate_simple(predictions: &[TokenPrediction]) -> Vec<TaggedEntity> {
    struct Group {
        start: usize,
        end: usize,
        label: String,
        score_sum: f32,
        tokens: usize,
    }

    fn finish(group: Group) -> TaggedEntity {
        TaggedEntity {
            start: group.start,
            end: group.end,
            label: group.label,
            score: group.score_sum / group.tokens as f32,
        }
    }

    let mut entities = Vec::new();
    let mut current: Option<Group> = None;

    for prediction in predictions {
        if prediction.label == "O" {
            if let Some(group) = current.take() {
                entities.push(finish(group));
            }
            continue;
        }

        let label = strip_iob_prefix(&prediction.label);
        let begins = prediction.label.starts_with("B-") || prediction.label.starts_with("S-");

        match current.as_mut() {
            Some(group) if !begins && group.label == label => {
                group.end = prediction.end;
                group.score_sum += prediction.score;
                group.tokens += 1;
            }
            _ => {
                if let Some(group) = current.take() {
                    entities.push(finish(group));
                }
                current = Some(Group {
                    start: prediction.start,
                    end: prediction.end,
                    label: label.to_string(),
                    score_sum: prediction.score,
                    tokens: 1,
                });
            }
        }
    }

    if let Some(group) = current {
        entities.push(finish(group));
    }

    entities
}

/// Split text into chunks of at most `max_chars` chars at whitespace
///
/// Returns `(char_offset, chunk)` pairs. Words longer than `max_chars` are
/// cut at char boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<(usize, &str)> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();

    // (char index, byte index) for each char plus the end
    let positions: Vec<(usize, usize)> = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()))
        .enumerate()
        .collect();
    let total = positions.len() - 1;

    let mut start = 0;
    while start < total {
        let mut end = (start + max_chars).min(total);

        if end < total {
            // Back off to the last whitespace inside the window
            let window_start_byte = positions[start].1;
            let window_end_byte = positions[end].1;
            if let Some(ws) = text[window_start_byte..window_end_byte].rfind(char::is_whitespace) {
                let split_byte = window_start_byte + ws;
                if let Ok(idx) = positions.binary_search_by_key(&split_byte, |p| p.1) {
                    if idx > start {
                        end = idx;
                    }
                }
            }
        }

        chunks.push((start, &text[positions[start].1..positions[end].1]));
        start = end;
    }

    chunks
}

#[cfg(feature = "ml-models")]
pub use inference::BertTokenTagger;

#[cfg(feature = "ml-models")]
mod inference {
    use super::{aggregate_simple, split_into_chunks, TokenPrediction};
    use crate::config::{DeviceSpec, EstBertConfig};
    use crate::model::{TaggedEntity, Tagger};
    use async_trait::async_trait;
    use candle_core::{DType, Device, Tensor, D};
    use candle_nn::{Linear, Module, VarBuilder};
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use estpii_core::{Error, Language, Result, TextIndex};
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tokenizers::Tokenizer;

    /// Fields of `config.json` not covered by the Candle BERT config
    #[derive(Debug, Deserialize)]
    struct LabelConfig {
        hidden_size: usize,
        #[serde(default = "default_max_positions")]
        max_position_embeddings: usize,
        id2label: HashMap<String, String>,
    }

    fn default_max_positions() -> usize {
        512
    }

    struct BertNer {
        model: BertModel,
        classifier: Linear,
        tokenizer: Tokenizer,
        device: Device,
        labels: Vec<String>,
        max_tokens: usize,
    }

    /// EstBERT (or any BERT token-classification checkpoint) run with Candle
    pub struct BertTokenTagger {
        model_name: String,
        max_chunk_chars: usize,
        inner: Arc<BertNer>,
    }

    impl BertTokenTagger {
        /// Load the model described by the configuration
        ///
        /// Blocking: reads weights from disk and may download from the
        /// Hugging Face hub. Any failure is `Error::ModelUnavailable`.
        pub fn load(config: &EstBertConfig) -> Result<Self> {
            let files = resolve_files(config)?;

            let tokenizer = Tokenizer::from_file(&files.tokenizer)
                .map_err(|e| Error::model_unavailable(format!("failed to load tokenizer: {}", e)))?;

            let raw_config = std::fs::read_to_string(&files.config)
                .map_err(|e| Error::model_unavailable(format!("failed to read config.json: {}", e)))?;
            let bert_config: BertConfig = serde_json::from_str(&raw_config)
                .map_err(|e| Error::model_unavailable(format!("failed to parse config.json: {}", e)))?;
            let label_config: LabelConfig = serde_json::from_str(&raw_config)
                .map_err(|e| Error::model_unavailable(format!("missing id2label in config.json: {}", e)))?;

            let labels = ordered_labels(&label_config.id2label)?;

            let device = match config.device {
                DeviceSpec::Cpu => Device::Cpu,
                DeviceSpec::Cuda { index } => Device::new_cuda(index)
                    .map_err(|e| Error::model_unavailable(format!("failed to initialize CUDA: {}", e)))?,
                DeviceSpec::Metal { index } => Device::new_metal(index)
                    .map_err(|e| Error::model_unavailable(format!("failed to initialize Metal: {}", e)))?,
            };

            let vb = if files.weights.extension().is_some_and(|ext| ext == "safetensors") {
                // SAFETY: the weights file is not modified while mapped
                unsafe {
                    VarBuilder::from_mmaped_safetensors(&[&files.weights], DType::F32, &device)
                        .map_err(|e| Error::model_unavailable(format!("failed to load weights: {}", e)))?
                }
            } else {
                VarBuilder::from_pth(&files.weights, DType::F32, &device)
                    .map_err(|e| Error::model_unavailable(format!("failed to load weights: {}", e)))?
            };

            let model = BertModel::load(vb.pp("bert"), &bert_config)
                .map_err(|e| Error::model_unavailable(format!("failed to load BERT: {}", e)))?;
            let classifier = candle_nn::linear(label_config.hidden_size, labels.len(), vb.pp("classifier"))
                .map_err(|e| Error::model_unavailable(format!("failed to load classifier head: {}", e)))?;

            tracing::info!(
                model = %config.model_name,
                labels = labels.len(),
                device = ?config.device,
                "Loaded BERT token classifier"
            );

            Ok(Self {
                model_name: config.model_name.clone(),
                max_chunk_chars: config.max_chunk_chars,
                inner: Arc::new(BertNer {
                    model,
                    classifier,
                    tokenizer,
                    device,
                    labels,
                    max_tokens: label_config.max_position_embeddings,
                }),
            })
        }
    }

    struct ModelFiles {
        config: PathBuf,
        tokenizer: PathBuf,
        weights: PathBuf,
    }

    fn resolve_files(config: &EstBertConfig) -> Result<ModelFiles> {
        if let Some(dir) = &config.model_path {
            return local_files(dir);
        }

        let mut builder = hf_hub::api::sync::ApiBuilder::new();
        if let Some(cache_dir) = config.cache_dir.clone().or_else(default_cache_dir) {
            builder = builder.with_cache_dir(cache_dir);
        }
        let api = builder
            .build()
            .map_err(|e| Error::model_unavailable(format!("failed to initialize hub client: {}", e)))?;

        let repo = api.repo(hf_hub::Repo::with_revision(
            config.model_name.clone(),
            hf_hub::RepoType::Model,
            config.revision.clone().unwrap_or_else(|| "main".to_string()),
        ));

        tracing::info!(model = %config.model_name, "Fetching model files from the hub");

        let fetch = |file: &str| {
            repo.get(file)
                .map_err(|e| Error::model_unavailable(format!("failed to fetch {}: {}", file, e)))
        };

        let weights = fetch("model.safetensors").or_else(|_| fetch("pytorch_model.bin"))?;

        Ok(ModelFiles {
            config: fetch("config.json")?,
            tokenizer: fetch("tokenizer.json")?,
            weights,
        })
    }

    fn local_files(dir: &Path) -> Result<ModelFiles> {
        let require = |name: &str| {
            let path = dir.join(name);
            if path.exists() {
                Ok(path)
            } else {
                Err(Error::model_unavailable(format!("{} not found", path.display())))
            }
        };

        let weights = require("model.safetensors").or_else(|_| require("pytorch_model.bin"))?;

        Ok(ModelFiles {
            config: require("config.json")?,
            tokenizer: require("tokenizer.json")?,
            weights,
        })
    }

    fn default_cache_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("estpii").join("models"))
    }

    fn ordered_labels(id2label: &HashMap<String, String>) -> Result<Vec<String>> {
        let mut indexed = id2label
            .iter()
            .map(|(id, label)| {
                id.parse::<usize>()
                    .map(|id| (id, label.clone()))
                    .map_err(|_| Error::model_unavailable(format!("invalid label id '{}'", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        indexed.sort_by_key(|(id, _)| *id);

        if indexed.iter().enumerate().any(|(i, (id, _))| i != *id) {
            return Err(Error::model_unavailable("id2label ids are not contiguous"));
        }

        Ok(indexed.into_iter().map(|(_, label)| label).collect())
    }

    impl BertNer {
        /// Predict a label per token of one chunk; offsets are chunk-relative chars
        fn predict_chunk(&self, chunk: &str) -> std::result::Result<Vec<TokenPrediction>, String> {
            let encoding = self
                .tokenizer
                .encode(chunk, true)
                .map_err(|e| format!("tokenization failed: {}", e))?;

            let mut ids = encoding.get_ids().to_vec();
            let mut type_ids = encoding.get_type_ids().to_vec();
            if ids.len() > self.max_tokens {
                tracing::warn!(
                    tokens = ids.len(),
                    max_tokens = self.max_tokens,
                    "Chunk exceeds model window, truncating"
                );
                ids.truncate(self.max_tokens);
                type_ids.truncate(self.max_tokens);
            }

            let input_ids = Tensor::new(ids.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| format!("failed to build input tensor: {}", e))?;
            let token_type_ids = Tensor::new(type_ids.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| format!("failed to build token type tensor: {}", e))?;

            let hidden = self
                .model
                .forward(&input_ids, &token_type_ids, None)
                .map_err(|e| format!("forward pass failed: {}", e))?;
            let probabilities = self
                .classifier
                .forward(&hidden)
                .and_then(|logits| candle_nn::ops::softmax(&logits, D::Minus1))
                .and_then(|p| p.squeeze(0))
                .and_then(|p| p.to_vec2::<f32>())
                .map_err(|e| format!("classification failed: {}", e))?;

            let index = TextIndex::new(chunk);
            let offsets = encoding.get_offsets();
            let special = encoding.get_special_tokens_mask();

            let mut predictions = Vec::with_capacity(probabilities.len());
            for (i, row) in probabilities.iter().enumerate() {
                let (byte_start, byte_end) = offsets[i];
                if special.get(i).copied().unwrap_or(0) == 1 || byte_start == byte_end {
                    continue;
                }

                let Some((label_idx, score)) = row
                    .iter()
                    .copied()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                else {
                    continue;
                };
                let Some((start, end)) = index.char_range(byte_start, byte_end) else {
                    continue;
                };

                predictions.push(TokenPrediction {
                    start,
                    end,
                    label: self.labels.get(label_idx).cloned().unwrap_or_else(|| "O".to_string()),
                    score,
                });
            }

            Ok(predictions)
        }

        fn tag_text(&self, text: &str, max_chunk_chars: usize) -> std::result::Result<Vec<TaggedEntity>, String> {
            let mut entities = Vec::new();
            for (offset, chunk) in split_into_chunks(text, max_chunk_chars) {
                let predictions = self.predict_chunk(chunk)?;
                entities.extend(aggregate_simple(&predictions).into_iter().map(|mut e| {
                    e.start += offset;
                    e.end += offset;
                    e
                }));
            }
            Ok(entities)
        }
    }

    #[async_trait]
    impl Tagger for BertTokenTagger {
        async fn tag(&self, text: &str, _language: &Language) -> Result<Vec<TaggedEntity>> {
            let inner = Arc::clone(&self.inner);
            let text = text.to_string();
            let max_chunk_chars = self.max_chunk_chars;

            tokio::task::spawn_blocking(move || inner.tag_text(&text, max_chunk_chars))
                .await
                .map_err(|e| Error::internal(format!("inference task failed: {}", e)))?
                .map_err(|msg| Error::recognizer(&self.model_name, msg))
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }

}
