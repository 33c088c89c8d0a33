use candle_core::{DType, Device, Tensor};

use voidx_core::config::EmbeddingSettings;
use voidx_core::traits::Embedder;
use voidx_core::types::SupportStatus;
use voidx_embed::pool::masked_mean;
use voidx_embed::{get_default_embedder, masked_mean_l2, HashEmbedder};

#[tokio::test]
async fn hash_embedder_shapes_and_determinism() {
    let embedder = HashEmbedder::new(1024);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed(&texts).await.expect("embed");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 1024, "embedding dim is 1024");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    assert!(v1.iter().all(|x| *x >= 0.0), "components are non-negative");

    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[tokio::test]
async fn hash_embedder_empty_input_is_empty_output() {
    let embedder = HashEmbedder::new(8).with_sparse(true);
    assert!(embedder.embed(&[]).await.expect("embed").is_empty());
    let (dense, sparse) = embedder.embed_hybrid(&[]).await.expect("hybrid");
    assert!(dense.is_empty() && sparse.is_empty());
}

#[tokio::test]
async fn hash_embedder_sparse_weights_follow_terms() {
    let embedder = HashEmbedder::new(16).with_sparse(true);
    assert_eq!(embedder.support_status(), SupportStatus::DenseAndSparse);

    let texts = vec!["beta beta gamma".to_string(), "Beta".to_string(), "delta".to_string()];
    let (dense, sparse) = embedder.embed_hybrid(&texts).await.expect("hybrid");
    assert_eq!(dense.len(), 3);
    assert_eq!(sparse.len(), 3);
    assert_eq!(sparse[0].len(), 2, "two distinct terms");
    let total: f32 = sparse[0].iter().map(|(_, w)| w).sum();
    assert!((total - 1.0).abs() < 1e-5);

    // lowercased tokens share their index
    assert!(sparse[0].dot(&sparse[1]) > 0.0);
    assert_eq!(sparse[1].dot(&sparse[2]), 0.0);
}

#[tokio::test]
async fn dense_only_hash_embedder_rejects_hybrid() {
    let embedder = HashEmbedder::new(4);
    assert_eq!(embedder.support_status(), SupportStatus::Dense);
    assert!(embedder.embed_hybrid(&["x".to_string()]).await.is_err());
}

#[test]
fn default_embedder_follows_settings() {
    let settings = EmbeddingSettings {
        provider: "hash".into(),
        dimensions: 32,
        sparse: false,
        ..EmbeddingSettings::default()
    };
    let embedder = get_default_embedder(&settings).expect("embedder");
    assert_eq!(embedder.dimensions(), 32);
    assert_eq!(embedder.support_status(), SupportStatus::Dense);
}

#[test]
fn masked_mean_l2_basic() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; second token is masked out.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0,  // token 0
                                 5.0, 6.0, 7.0, 8.0],    // token 1
                               (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1i64, 0i64], (1, 2), &dev).unwrap()
        .to_dtype(DType::F32).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let v = &v[0];
    let norm: f32 = (1.0f32*1.0 + 2.0*2.0 + 3.0*3.0 + 4.0*4.0).sqrt();
    let expected = [1.0/norm, 2.0/norm, 3.0/norm, 4.0/norm];
    for (a,b) in v.iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}

#[test]
fn masked_mean_survives_all_padding() {
    let dev = Device::Cpu;
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], (1, 2, 2), &dev).unwrap();
    let mask = Tensor::from_slice(&[0f32, 0.0], (1, 2), &dev).unwrap();
    let v: Vec<Vec<f32>> = masked_mean(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(v[0].iter().all(|x| *x == 0.0));

    let v: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    assert!(v[0].iter().all(|x| x.is_finite()));
}
