//! Shared wiring for the voidx binaries: configuration, logging, the Milvus
//! client, the embedder and the collection manager.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use voidx_core::cancel::CancellationToken;
use voidx_core::config::{resolve_with_base, Config, LoggingSettings};
use voidx_core::types::Document;
use voidx_embed::get_default_embedder;
use voidx_hybrid::{Field, Manager, ManagerOptions};
use voidx_vector::MilvusClient;

pub struct App {
    pub config: Config,
    pub manager: Manager,
}

/// Config directory: `APP_CONFIG_DIR`, else the working directory.
pub fn config_dir() -> PathBuf {
    std::env::var("APP_CONFIG_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// `RUST_LOG` wins over `logging.filter`.
pub fn init_logging(settings: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn bootstrap() -> Result<App> {
    let dir = config_dir();
    let mut config = Config::load_from(&dir).context("loading configuration")?;
    init_logging(&config.logging);

    // a relative model directory is relative to the config directory
    if let Some(model_dir) = config.embedding.model_dir.take() {
        config.embedding.model_dir = Some(resolve_with_base(&dir, model_dir).display().to_string());
    }

    let client = Arc::new(MilvusClient::new(&config.milvus)?);
    let embedder = get_default_embedder(&config.embedding)?;
    let manager = Manager::new(ManagerOptions::from_settings(client, embedder, &config.store))?;
    tracing::info!(
        endpoint = %config.milvus.endpoint,
        kind = manager.get_type(),
        hybrid = manager.is_hybrid(),
        "voidx ready"
    );
    Ok(App { config, manager })
}

/// A token that fires on Ctrl-C.
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let t = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted, stopping after the current call");
            t.cancel();
        }
    });
    token
}

/// One JSON object per non-blank line.
pub fn parse_jsonl(text: &str) -> Result<Vec<Document>> {
    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(n, line)| match serde_json::from_str(line) {
            Ok(serde_json::Value::Object(doc)) => Ok(doc),
            Ok(_) => Err(anyhow!("line {}: expected a JSON object", n + 1)),
            Err(e) => Err(anyhow!("line {}: {e}", n + 1)),
        })
        .collect()
}

pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_jsonl(&text).with_context(|| format!("parsing {}", path.display()))
}

/// A JSON array of field declarations.
pub fn read_fields(path: &Path) -> Result<Vec<Field>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing field list {}", path.display()))
}

/// Comma-separated list, blanks dropped.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use voidx_hybrid::FieldType;

    #[test]
    fn jsonl_skips_blank_lines_and_names_bad_ones() {
        let docs = parse_jsonl("{\"id\": 1, \"text\": \"a\"}\n\n  \n{\"id\": 2}\n").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["id"], 2);

        let err = parse_jsonl("{\"id\": 1}\n[1, 2]\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_jsonl("{oops").is_err());
    }

    #[test]
    fn field_files_deserialize() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fields.json");
        fs::write(
            &path,
            r#"[{"name": "id", "type": "int64", "is_primary": true},
                {"name": "body", "type": "text", "indexing": true}]"#,
        )
        .unwrap();
        let fields = read_fields(&path).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields[0].is_primary);
        assert_eq!(fields[1].field_type, FieldType::Text);
        assert!(fields[1].indexing);
        assert!(read_fields(&tmp.path().join("missing.json")).is_err());
    }

    #[test]
    fn lists_split_on_commas() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" ").is_empty());
    }
}
