//! Sentence-transformer embedder on Candle.
//!
//! Loads a BERT-architecture sentence-transformer from the Hugging Face Hub
//! (`config.json`, `tokenizer.json`, `model.safetensors`), runs batched
//! forward passes, mean-pools over the attention mask and L2-normalizes.

use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use meetnews_shared::{MeetNewsError, RankingConfig, Result};

use crate::model::{ModelLoader, ScoringModel};
use crate::pooling::{l2_normalize, mean_pool};

/// BERT's positional embedding table caps the sequence length.
const MAX_POSITIONS: usize = 512;

fn ranking_err(context: &str, e: impl std::fmt::Display) -> MeetNewsError {
    MeetNewsError::Ranking(format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// SentenceEmbedder
// ---------------------------------------------------------------------------

/// A loaded sentence-transformer.
pub struct SentenceEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_token_id: u32,
    max_length: usize,
    batch_size: usize,
}

impl SentenceEmbedder {
    /// Download (or reuse the cached copy of) the model and load it.
    ///
    /// Blocking: network and disk I/O plus weight loading.
    pub fn load(config: &RankingConfig) -> Result<Self> {
        let start = Instant::now();
        info!(model = %config.model_id, "loading sentence-transformer");

        let device = select_device(config.use_gpu);
        debug!(?device, "selected device");

        let api = Api::new().map_err(|e| ranking_err("hub client", e))?;
        let repo = api.repo(Repo::new(config.model_id.clone(), RepoType::Model));

        let config_path = repo.get("config.json").map_err(|e| ranking_err("config.json", e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| ranking_err("tokenizer.json", e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| ranking_err("model.safetensors", e))?;

        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| MeetNewsError::io(&config_path, e))?;
        let bert_config: Config =
            serde_json::from_str(&raw).map_err(|e| ranking_err("config.json", e))?;

        let tokenizer =
            Tokenizer::from_file(&tokenizer_path).map_err(|e| ranking_err("tokenizer", e))?;

        // SAFETY: the safetensors file is owned by the hub cache and not
        // modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)
                .map_err(|e| ranking_err("weights", e))?
        };
        let model = BertModel::load(vb, &bert_config).map_err(|e| ranking_err("model", e))?;

        info!(
            model = %config.model_id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "sentence-transformer loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            pad_token_id: bert_config.pad_token_id as u32,
            max_length: config.max_length.clamp(1, MAX_POSITIONS),
            batch_size: config.batch_size.max(1),
        })
    }

    fn embed_batch(&self, texts: &[String]) -> candle_core::Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(candle_core::Error::msg)?;

        let lengths: Vec<usize> = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.max_length))
            .collect();
        let seq_len = lengths.iter().copied().max().unwrap_or(0).max(1);
        let batch = encodings.len();

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut type_ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);

        for (encoding, &len) in encodings.iter().zip(&lengths) {
            ids.extend_from_slice(&encoding.get_ids()[..len]);
            type_ids.extend_from_slice(&encoding.get_type_ids()[..len]);
            mask.extend_from_slice(&encoding.get_attention_mask()[..len]);

            let pad = seq_len - len;
            ids.extend(std::iter::repeat_n(self.pad_token_id, pad));
            type_ids.extend(std::iter::repeat_n(0u32, pad));
            mask.extend(std::iter::repeat_n(0u32, pad));
        }

        let input_ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(type_ids, (batch, seq_len), &self.device)?;
        let attention_mask =
            Tensor::from_vec(mask, (batch, seq_len), &self.device)?.to_dtype(DType::F32)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = mean_pool(&hidden, &attention_mask)?;
        l2_normalize(&pooled)?.to_vec2::<f32>()
    }
}

impl ScoringModel for SentenceEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(
                self.embed_batch(chunk)
                    .map_err(|e| ranking_err("embedding", e))?,
            );
        }
        debug!(
            texts = texts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "embedded batch"
        );
        Ok(out)
    }
}

/// Pick an accelerator when compiled in and present, else the CPU.
fn select_device(use_gpu: bool) -> Device {
    if !use_gpu {
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return device,
            Err(e) => debug!(error = %e, "CUDA unavailable, using CPU"),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return device,
            Err(e) => debug!(error = %e, "Metal unavailable, using CPU"),
        }
    }

    Device::Cpu
}

// ---------------------------------------------------------------------------
// HubModelLoader
// ---------------------------------------------------------------------------

/// Loads a [`SentenceEmbedder`] from the Hugging Face Hub.
pub struct HubModelLoader {
    config: RankingConfig,
}

impl HubModelLoader {
    pub fn new(config: RankingConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for HubModelLoader {
    fn load(&self) -> Result<Arc<dyn ScoringModel>> {
        Ok(Arc::new(SentenceEmbedder::load(&self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_when_gpu_disabled() {
        assert!(matches!(select_device(false), Device::Cpu));
    }

    #[test]
    fn ranking_err_carries_context() {
        let err = ranking_err("tokenizer.json", "404");
        assert_eq!(err.to_string(), "ranking error: tokenizer.json: 404");
    }
}
