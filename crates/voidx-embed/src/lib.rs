//! voidx-embed
//!
//! Concrete `Embedder` implementations: a deterministic hash embedder for
//! tests and offline development, and a local BGE-M3 model producing dense
//! and sparse vectors.

use std::sync::Arc;

use voidx_core::config::EmbeddingSettings;
use voidx_core::traits::Embedder;
use voidx_core::{Error, Result};

pub mod bge;
pub mod device;
pub mod hash;
pub mod pool;
pub mod tokenize;

pub use bge::BgeM3Embedder;
pub use device::DevicePreference;
pub use hash::HashEmbedder;
pub use pool::masked_mean_l2;

/// Builds the configured embedder. `APP_USE_FAKE_EMBEDDINGS=1` forces the
/// hash embedder regardless of the configured provider.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake || settings.provider == "hash" {
        tracing::info!(dim = settings.dimensions, sparse = settings.sparse, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimensions).with_sparse(settings.sparse)));
    }
    match settings.provider.as_str() {
        "bge-m3" => {
            let device = DevicePreference::parse(&settings.device)?;
            let model = BgeM3Embedder::new(settings.model_dir.as_deref(), device)
                .map_err(|e| Error::InvalidConfig(format!("failed to load BGE-M3: {e:#}")))?;
            Ok(Arc::new(model))
        }
        other => Err(Error::InvalidConfig(format!("unknown embedding provider '{other}'"))),
    }
}
