use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use voidx_core::traits::Embedder;
use voidx_core::types::{SparseVector, SupportStatus};

use crate::device::{select_device, DevicePreference};
use crate::pool::masked_mean_l2;
use crate::tokenize::Tokenized;

const MAX_LEN: usize = 256;
/// `<s>`, `<pad>`, `</s>`, `<unk>` in the XLM-R vocabulary never carry lexical weight.
const SPECIAL_TOKENS: [u32; 4] = [0, 1, 2, 3];

type Encoded = (Vec<f32>, Option<SparseVector>);

/// Local BGE-M3 model: dense vectors from masked mean pooling, sparse lexical
/// weights from the `sparse_linear` head when its weights are present.
///
/// Forward passes run on the blocking pool so embedding never stalls the
/// async workers.
pub struct BgeM3Embedder {
    model: Arc<BgeM3Model>,
}

struct BgeM3Model {
    model: XLMRobertaModel,
    sparse_head: Option<Linear>,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl BgeM3Embedder {
    pub fn new(model_dir: Option<&str>, device: DevicePreference) -> Result<Self> {
        Ok(Self { model: Arc::new(BgeM3Model::load(model_dir, device)?) })
    }

    async fn encode_all(
        &self,
        texts: &[String],
        want_sparse: bool,
    ) -> voidx_core::Result<Vec<Encoded>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let task = tokio::task::spawn_blocking(move || {
            texts.iter().map(|t| model.encode(t, want_sparse)).collect::<Result<Vec<_>>>()
        });
        task.await
            .map_err(|e| voidx_core::Error::Embedding(format!("embedding task failed: {e}")))?
            .map_err(to_core)
    }
}

impl BgeM3Model {
    fn load(model_dir: Option<&str>, device: DevicePreference) -> Result<Self> {
        let device = select_device(device)?;
        let model_dir = resolve_model_dir(model_dir)?;
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!("Failed to load tokenizer from {}: {e}", tokenizer_path.display())
        })?;

        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let dim = config.hidden_size;

        let vb = load_pickle(&model_dir.join("pytorch_model.bin"), &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;

        let sparse_path = model_dir.join("sparse_linear.pt");
        let sparse_head = if sparse_path.exists() {
            let vb = load_pickle(&sparse_path, &device)?;
            Some(candle_nn::linear(dim, 1, vb)?)
        } else {
            let path = sparse_path.display();
            tracing::warn!(%path, "sparse head missing; dense-only embeddings");
            None
        };

        tracing::info!(dim, sparse = sparse_head.is_some(), "BGE-M3 model loaded");
        Ok(Self { model, sparse_head, tokenizer, device, dim })
    }

    fn encode(&self, text: &str, want_sparse: bool) -> Result<Encoded> {
        let start = Instant::now();
        let tok = Tokenized::encode(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device)?;
        let hidden = self.model.forward(
            &tok.input_ids,
            &tok.attention_mask,
            &token_type_ids,
            None,
            None,
            None,
        )?;

        let pooled = masked_mean_l2(&hidden, &tok.attention_mask)?;
        let dense: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if dense.len() != self.dim {
            return Err(anyhow!("pooled vector has {} dims, expected {}", dense.len(), self.dim));
        }

        let sparse = match (&self.sparse_head, want_sparse) {
            (Some(head), true) => Some(sparse_weights(head, &hidden, &tok.ids, &tok.mask)?),
            _ => None,
        };

        let elapsed = start.elapsed().as_millis();
        if elapsed > 100 {
            tracing::debug!(elapsed_ms = elapsed as u64, "slow embedding");
        }
        Ok((dense, sparse))
    }
}

/// ReLU of the per-token head output, max-pooled per token id.
fn sparse_weights(
    head: &Linear,
    hidden: &Tensor,
    ids: &[u32],
    mask: &[u32],
) -> Result<SparseVector> {
    let logits = head.forward(hidden)?.relu()?;
    let weights: Vec<f32> = logits.to_device(&Device::Cpu)?.squeeze(2)?.squeeze(0)?.to_vec1()?;
    let mut out = SparseVector::new();
    for ((&id, &m), &w) in ids.iter().zip(mask.iter()).zip(weights.iter()) {
        if m == 0 || SPECIAL_TOKENS.contains(&id) || w <= 0.0 {
            continue;
        }
        out.insert_max(id, w);
    }
    Ok(out)
}

fn load_pickle(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let tensors = candle_core::pickle::read_all(path)?;
    let map: HashMap<String, Tensor> = tensors.into_iter().collect();
    Ok(VarBuilder::from_tensors(map, DType::F32, device))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(str::to_string)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok())
        .chain(std::env::var("MODEL_DIR").ok())
        .map(PathBuf::from)
        .chain([PathBuf::from("../models/bge-m3"), PathBuf::from("models/bge-m3")]);
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

fn to_core(e: anyhow::Error) -> voidx_core::Error {
    voidx_core::Error::Embedding(format!("{e:#}"))
}

#[async_trait]
impl Embedder for BgeM3Embedder {
    fn dimensions(&self) -> usize {
        self.model.dim
    }

    fn support_status(&self) -> SupportStatus {
        if self.model.sparse_head.is_some() {
            SupportStatus::DenseAndSparse
        } else {
            SupportStatus::Dense
        }
    }

    async fn embed(&self, texts: &[String]) -> voidx_core::Result<Vec<Vec<f32>>> {
        let encoded = self.encode_all(texts, false).await?;
        Ok(encoded.into_iter().map(|(d, _)| d).collect())
    }

    async fn embed_hybrid(
        &self,
        texts: &[String],
    ) -> voidx_core::Result<(Vec<Vec<f32>>, Vec<SparseVector>)> {
        if self.model.sparse_head.is_none() {
            return Err(voidx_core::Error::invalid_arg("BGE-M3 sparse head is not loaded"));
        }
        let encoded = self.encode_all(texts, true).await?;
        Ok(encoded.into_iter().map(|(d, s)| (d, s.unwrap_or_default())).unzip())
    }
}
