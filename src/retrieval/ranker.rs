//! Best-Document Selection
//!
//! Aggregates per-chunk nearest-neighbor distances into per-document mean
//! distances and selects the document(s) that best answer a query.
//! Averaging rewards documents with many close chunks over documents with
//! one lucky hit, which is a cheap relevance-quality signal compared to
//! re-ranking with the chat model. Near-ties are surfaced to the caller
//! rather than resolved arbitrarily.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Documents whose mean distance is within this margin of the best mean
/// are returned alongside it (inclusive).
pub const NEAR_TIE_MARGIN: f64 = 0.2;

/// One nearest-neighbor result, already mapped to its source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborHit {
    pub document_id: String,
    /// Non-negative; smaller is more similar.
    pub distance: f64,
}

/// Per-document aggregate over one query's hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAggregate {
    pub document_id: String,
    pub mean_distance: f64,
    pub hit_count: usize,
}

/// Group hits by document and compute mean distances, ordered by
/// `(mean_distance, document_id)` — best first, deterministic under exact
/// ties.
pub fn aggregate(hits: &[NeighborHit]) -> Vec<DocumentAggregate> {
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for hit in hits {
        let entry = sums.entry(hit.document_id.as_str()).or_insert((0.0, 0));
        entry.0 += hit.distance;
        entry.1 += 1;
    }

    let mut aggregates: Vec<DocumentAggregate> = sums
        .into_iter()
        .map(|(document_id, (sum, count))| DocumentAggregate {
            document_id: document_id.to_string(),
            mean_distance: sum / count as f64,
            hit_count: count,
        })
        .collect();

    aggregates.sort_by(|a, b| {
        a.mean_distance
            .partial_cmp(&b.mean_distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });

    aggregates
}

/// Select the best-matching document(s) for one query.
///
/// Empty input returns the empty set — the "no relevant documents"
/// outcome, distinct from any failure. Otherwise every document whose mean
/// distance is within [`NEAR_TIE_MARGIN`] of the minimum (inclusive) is
/// returned, best first: a singleton means one clear winner, more than one
/// means genuinely competing candidates.
pub fn select_best_documents(hits: &[NeighborHit]) -> Vec<String> {
    let aggregates = aggregate(hits);
    let min_mean = match aggregates.first() {
        Some(best) => best.mean_distance,
        None => return Vec::new(),
    };

    let selected: Vec<String> = aggregates
        .into_iter()
        .take_while(|a| a.mean_distance - min_mean <= NEAR_TIE_MARGIN)
        .map(|a| a.document_id)
        .collect();

    debug!(
        selected = selected.len(),
        min_mean = min_mean,
        "Selected best documents"
    );
    selected
}
