//! Layered configuration loader.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env
//! vars (`__` separates nested keys, e.g. `APP_STORE__BATCH_SIZE=50`).
//! Every section has defaults, so a missing file is not an error.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub milvus: MilvusSettings,
    pub store: StoreSettings,
    pub embedding: EmbeddingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MilvusSettings {
    pub endpoint: String,
    pub token: Option<String>,
    pub database: String,
    /// No timeout unless set; deadlines belong to the caller.
    pub request_timeout_secs: Option<u64>,
}

impl Default for MilvusSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:19530".to_string(),
            token: None,
            database: "default".to_string(),
            request_timeout_secs: None,
        }
    }
}

/// An ANN index definition as handed to the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    pub index_type: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl IndexConfig {
    pub fn hnsw(m: u32, ef_construction: u32) -> Self {
        let mut params = serde_json::Map::new();
        params.insert("M".to_string(), m.into());
        params.insert("efConstruction".to_string(), ef_construction.into());
        Self { index_type: "HNSW".to_string(), params }
    }

    pub fn sparse_inverted(drop_ratio: f64) -> Self {
        let mut params = serde_json::Map::new();
        params.insert("drop_ratio_build".to_string(), drop_ratio.into());
        Self { index_type: "SPARSE_INVERTED_INDEX".to_string(), params }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    /// `None` means "hybrid iff the embedder supports sparse".
    pub enable_hybrid: Option<bool>,
    pub dense_index: IndexConfig,
    pub dense_metric: String,
    pub sparse_index: IndexConfig,
    pub sparse_metric: String,
    pub shard_num: u32,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub fusion_alpha: f32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            enable_hybrid: None,
            dense_index: IndexConfig::hnsw(30, 360),
            dense_metric: "IP".to_string(),
            sparse_index: IndexConfig::sparse_inverted(0.2),
            sparse_metric: "IP".to_string(),
            shard_num: 1,
            batch_size: 100,
            poll_interval_ms: 500,
            fusion_alpha: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `hash` or `bge-m3`.
    pub provider: String,
    pub dimensions: usize,
    pub sparse: bool,
    pub model_dir: Option<String>,
    /// `auto`, `cpu` or `metal`.
    pub device: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            dimensions: 1024,
            sparse: true,
            model_dir: None,
            device: "auto".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl Config {
    /// Loads from the working directory, env taken from `RUST_ENV` (default `dev`).
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(dir, &env_name)
    }

    pub fn load_for_env(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(dir.join("config.toml")));
        if let Some(file) = env_file(env_name) {
            figment = figment.merge(Toml::file(dir.join(file)));
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config: Config = figment
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("failed to load configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let store = &self.store;
        if store.batch_size == 0 {
            return Err(Error::InvalidConfig("store.batch_size must be at least 1".into()));
        }
        if store.shard_num == 0 {
            return Err(Error::InvalidConfig("store.shard_num must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&store.fusion_alpha) {
            return Err(Error::InvalidConfig(format!(
                "store.fusion_alpha must be within [0, 1], got {}",
                store.fusion_alpha
            )));
        }
        match self.embedding.provider.as_str() {
            "hash" | "bge-m3" => {}
            other => {
                let msg = format!("unknown embedding provider '{other}'");
                return Err(Error::InvalidConfig(msg));
            }
        }
        match self.embedding.device.trim().to_ascii_lowercase().as_str() {
            "" | "auto" | "cpu" | "metal" | "mps" => {}
            other => {
                let msg = format!("unknown embedding device '{other}'");
                return Err(Error::InvalidConfig(msg));
            }
        }
        if self.embedding.provider == "hash" && self.embedding.dimensions == 0 {
            return Err(Error::InvalidConfig("embedding.dimensions must be at least 1".into()));
        }
        Ok(())
    }
}

fn env_file(env_name: &str) -> Option<&'static str> {
    match env_name {
        "dev" | "development" => Some("config.dev.toml"),
        "prod" | "production" => Some("config.prod.toml"),
        "test" | "testing" => Some("config.test.toml"),
        _ => None,
    }
}

/// Resolve a possibly relative path against a given base directory.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = PathBuf::from(p.as_ref());
    if p.is_absolute() { p } else { base.join(p) }
}
