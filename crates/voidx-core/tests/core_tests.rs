use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use voidx_core::cancel::{cancellable, CancellationToken};
use voidx_core::config::{Config, IndexConfig};
use voidx_core::error::Error;
use voidx_core::progress::ProgressBar;
use voidx_core::types::SparseVector;

#[test]
fn progress_add_n_is_monotonic_and_capped() {
    let bar = ProgressBar::new(250);
    let mut last = 0;
    for _ in 0..5 {
        bar.add_n(60);
        let done = bar.state().done;
        assert!(done >= last, "done never decreases");
        last = done;
        let p = bar.get_progress().percent;
        assert!(p <= 100);
    }
    assert_eq!(bar.state().done, 250, "done is capped at total");
    assert_eq!(bar.get_progress().percent, 100);
    assert_eq!(bar.get_progress().remaining_seconds, 0);
}

#[test]
fn progress_freezes_after_error() {
    let bar = ProgressBar::new(250);
    let watch = bar.watch();
    bar.add_n(100);
    bar.report_error(&"embedder exploded");
    bar.add_n(100);

    let state = watch.state();
    assert_eq!(state.done, 100);
    assert_eq!(state.failed, 150);
    assert_eq!(state.error_message.as_deref(), Some("embedder exploded"));
    let snap = watch.get_progress();
    assert_eq!(snap.percent, 40);
    assert!(watch.is_finished());

    // the first error wins
    bar.report_error(&"second");
    assert_eq!(watch.state().error_message.as_deref(), Some("embedder exploded"));

    bar.reset(10);
    assert_eq!(watch.state().done, 0);
    assert!(watch.state().error_message.is_none());
}

#[test]
fn progress_concurrent_add_n_serializes() {
    let bar = ProgressBar::new(8_000);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let b = bar.clone();
            thread::spawn(move || {
                for _ in 0..1_000 {
                    b.add_n(1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("join");
    }
    assert_eq!(bar.state().done, 8_000);
    assert_eq!(bar.get_progress().percent, 100);
}

#[test]
fn sparse_vector_dot_and_packing() {
    let a: SparseVector = [(1, 0.5), (7, 2.0), (9, 1.0)].into_iter().collect();
    let b: SparseVector = [(7, 0.5), (9, 3.0), (100, 4.0)].into_iter().collect();
    assert!((a.dot(&b) - 4.0).abs() < 1e-6);
    assert!((b.dot(&a) - 4.0).abs() < 1e-6);

    let (idx, vals) = a.packed();
    assert_eq!(idx, vec![1, 7, 9]);
    assert_eq!(SparseVector::from_packed(&idx, &vals), a);

    let mut m = SparseVector::new();
    m.insert_max(3, 0.2);
    m.insert_max(3, 0.1);
    m.insert_max(3, 0.9);
    assert_eq!(m.iter().collect::<Vec<_>>(), vec![(3, 0.9)]);
}

#[test]
fn config_defaults_without_files() {
    let tmp = TempDir::new().expect("tmp");
    let config = Config::load_for_env(tmp.path(), "test").expect("load");
    assert_eq!(config.store.batch_size, 100);
    assert_eq!(config.store.shard_num, 1);
    assert_eq!(config.store.dense_metric, "IP");
    assert_eq!(config.store.sparse_metric, "IP");
    assert_eq!(config.store.dense_index, IndexConfig::hnsw(30, 360));
    assert_eq!(config.store.sparse_index, IndexConfig::sparse_inverted(0.2));
    assert_eq!(config.store.enable_hybrid, None);
    assert!((config.store.fusion_alpha - 0.5).abs() < f32::EPSILON);
    assert_eq!(config.milvus.request_timeout_secs, None);
}

#[test]
fn config_env_file_overrides_base_file() {
    let tmp = TempDir::new().expect("tmp");
    fs::write(
        tmp.path().join("config.toml"),
        "[store]\nbatch_size = 32\nshard_num = 2\n\n[milvus]\nendpoint = \"http://milvus:19530\"\n",
    )
    .expect("write base");
    let overlay = "[store]\nbatch_size = 8\nenable_hybrid = false\n";
    fs::write(tmp.path().join("config.test.toml"), overlay).expect("write env");

    let config = Config::load_for_env(tmp.path(), "test").expect("load");
    assert_eq!(config.store.batch_size, 8);
    assert_eq!(config.store.shard_num, 2);
    assert_eq!(config.store.enable_hybrid, Some(false));
    assert_eq!(config.milvus.endpoint, "http://milvus:19530");

    let prod = Config::load_for_env(tmp.path(), "prod").expect("load prod");
    assert_eq!(prod.store.batch_size, 32, "config.test.toml only applies to the test env");
}

#[test]
fn config_rejects_invalid_values() {
    let tmp = TempDir::new().expect("tmp");
    fs::write(tmp.path().join("config.toml"), "[store]\nbatch_size = 0\n").expect("write");
    let err = Config::load_for_env(tmp.path(), "test").expect_err("zero batch size");
    assert!(matches!(err, Error::InvalidConfig(_)));

    let unknown = "[embedding]\nprovider = \"word2vec\"\n";
    fs::write(tmp.path().join("config.toml"), unknown).expect("write");
    let err = Config::load_for_env(tmp.path(), "test").expect_err("unknown provider");
    assert!(err.to_string().contains("word2vec"));

    fs::write(tmp.path().join("config.toml"), "[embedding]\ndevice = \"tpu\"\n").expect("write");
    let err = Config::load_for_env(tmp.path(), "test").expect_err("unknown device");
    assert!(err.to_string().contains("tpu"));
}

#[test]
fn error_retry_classes() {
    assert!(Error::Transient("loading".into()).is_retryable());
    assert!(Error::backend("insert", "boom").is_retryable());
    assert!(!Error::invalid_arg("x").is_retryable());
    assert!(!Error::Cancelled.is_retryable());

    let err = Error::backend("insert rows", "connection reset");
    let source = std::error::Error::source(&err).expect("source kept");
    assert_eq!(source.to_string(), "connection reset");
}

#[tokio::test]
async fn cancellable_prefers_cancellation() {
    let token = CancellationToken::new();
    let ok = cancellable(&token, async { Ok::<_, Error>(7) }).await.expect("not cancelled");
    assert_eq!(ok, 7);

    token.cancel();
    let err = cancellable(&token, async { Ok::<_, Error>(7) }).await.expect_err("cancelled");
    assert!(err.is_cancelled());

    let token = Arc::new(CancellationToken::new());
    let t = Arc::clone(&token);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        t.cancel();
    });
    let err = voidx_core::cancel::sleep(&token, Duration::from_secs(30))
        .await
        .expect_err("woken early");
    assert!(err.is_cancelled());
}
