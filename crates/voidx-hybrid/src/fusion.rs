//! Score fusion for hybrid retrieval.
//!
//! Each ranked list is scaled by its own maximum, then combined as
//! `alpha * dense + (1 - alpha) * sparse`; a document missing from one list
//! contributes 0 from it. Per-field results are merged keeping each
//! document's best field.

use std::collections::HashMap;

use voidx_core::types::{DocId, Document, ScoredDocument};
use voidx_vector::Hit;

/// One document's fused score within a single field's search.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: DocId,
    pub score: f32,
    pub fields: Document,
}

/// Scales scores into `[0, 1]` by the list maximum. Negative scores clamp
/// to 0; a list whose maximum is not positive scales to all zeros.
fn normalized(hits: &[Hit]) -> impl Iterator<Item = (&Hit, f32)> {
    let max = hits.iter().map(|h| h.score).fold(f32::NEG_INFINITY, f32::max);
    hits.iter().map(move |h| {
        let s = if max > 0.0 { (h.score / max).clamp(0.0, 1.0) } else { 0.0 };
        (h, s)
    })
}

/// Fuses the dense and (in hybrid mode) sparse lists of one field. Without
/// a sparse list the normalized dense score is used as is.
pub fn fuse(dense: &[Hit], sparse: Option<&[Hit]>, alpha: f32) -> Vec<FusedHit> {
    let (dense_weight, sparse_weight) = match sparse {
        Some(_) => (alpha, 1.0 - alpha),
        None => (1.0, 0.0),
    };
    let mut order: Vec<DocId> = Vec::new();
    let mut by_id: HashMap<DocId, FusedHit> = HashMap::new();
    let lists = [(dense, dense_weight), (sparse.unwrap_or(&[]), sparse_weight)];
    for (hits, weight) in lists {
        for (hit, s) in normalized(hits) {
            by_id
                .entry(hit.id)
                .and_modify(|f| f.score += weight * s)
                .or_insert_with(|| {
                    order.push(hit.id);
                    FusedHit { id: hit.id, score: weight * s, fields: hit.fields.clone() }
                });
        }
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

/// Merges per-field results: a document keeps its maximum score and the
/// field that produced it (the earlier field wins ties). Applies the
/// threshold, orders by score descending then id ascending, and truncates.
pub fn merge_fields(
    per_field: Vec<(String, Vec<FusedHit>)>,
    score_threshold: Option<f32>,
    top_k: usize,
) -> Vec<ScoredDocument> {
    let mut best: HashMap<DocId, ScoredDocument> = HashMap::new();
    for (field, hits) in per_field {
        for hit in hits {
            match best.get_mut(&hit.id) {
                Some(existing) if hit.score > existing.score => {
                    existing.score = hit.score;
                    existing.matched_field = field.clone();
                }
                Some(_) => {}
                None => {
                    let doc = ScoredDocument {
                        id: hit.id,
                        score: hit.score,
                        fields: hit.fields,
                        matched_field: field.clone(),
                    };
                    best.insert(hit.id, doc);
                }
            }
        }
    }
    let mut out: Vec<ScoredDocument> = best
        .into_values()
        .filter(|d| score_threshold.map_or(true, |t| d.score >= t))
        .collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    out.truncate(top_k);
    out
}
