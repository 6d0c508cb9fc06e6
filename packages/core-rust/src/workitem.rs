//! Work-item payloads and the compute-heavy enrichment routine.
//!
//! A `work-item` event carries a JSON-encoded [`ProcessedWorkItem`] produced
//! by the parse stage. Enrichment derives per-group statistics (exposed as
//! "eigenvalues", a simplification and not an eigendecomposition), a matrix
//! score, and a score from a fixed-iteration accumulation loop whose cost is
//! linear in the configured iteration count. The result is re-encoded into
//! the event payload as an [`EnrichedWorkItem`].

use std::hint::black_box;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::event::{EnrichedEvent, RawEvent};

/// Iteration count used when none is configured.
pub const DEFAULT_ITERATIONS: u32 = 500;

/// Per-iteration scale applied in the score loop.
pub const SCORE_SCALE: f64 = 0.001;

/// Maximum number of statistics entries reported as eigenvalues.
pub const MAX_EIGENVALUES: usize = 10;

/// Tag attached to every enriched work item.
pub const WORKLOAD_TAG_KEY: &str = "workload";
pub const WORKLOAD_TAG_VALUE: &str = "compute-heavy";

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    #[serde(default)]
    pub values: Vec<f64>,
}

impl From<Vec<f64>> for Vector {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Matrix {
    #[serde(default)]
    pub rows: Vec<Vector>,
}

/// Work item as emitted by the parse stage: normalized vectors, the
/// transposed matrix and the parse-side checksum.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedWorkItem {
    pub id: String,
    #[serde(default, alias = "normalized_vectors")]
    pub normalized_vectors: Vec<Vector>,
    #[serde(default, alias = "transposed_matrix")]
    pub transposed_matrix: Matrix,
    #[serde(default)]
    pub checksum: f64,
}

impl ProcessedWorkItem {
    /// Decodes a work item from an event payload.
    ///
    /// # Errors
    ///
    /// Returns `EnrichError::Decode` if the payload is not valid JSON or does
    /// not match the work-item structure.
    pub fn decode(payload: &str) -> Result<Self, EnrichError> {
        serde_json::from_str(payload).map_err(EnrichError::Decode)
    }

    /// Encodes the work item as a payload string.
    ///
    /// # Errors
    ///
    /// Returns `EnrichError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<String, EnrichError> {
        serde_json::to_string(self).map_err(EnrichError::Encode)
    }
}

/// Result of enrichment, re-encoded into the outgoing event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedWorkItem {
    pub id: String,
    pub eigenvalues: Vec<f64>,
    pub score: f64,
    #[serde(alias = "processing_time_ms")]
    pub processing_time_ms: f64,
}

// ---------------------------------------------------------------------------
// EnrichError
// ---------------------------------------------------------------------------

/// Reasons a work item cannot be enriched. None of them end the stream.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("work item payload could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("work item {id} produced a non-finite {field}")]
    Compute { id: String, field: &'static str },
    #[error("enriched work item could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

impl EnrichError {
    /// Short label for structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Compute { .. } => "compute",
            Self::Encode(_) => "encode",
        }
    }
}

// ---------------------------------------------------------------------------
// WorkItemEnricher
// ---------------------------------------------------------------------------

/// Computes synthetic features and a CPU-bound score for work items.
///
/// Stateless apart from the iteration count, so one instance can be shared
/// by every stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItemEnricher {
    iterations: u32,
}

impl Default for WorkItemEnricher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl WorkItemEnricher {
    #[must_use]
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    #[must_use]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Enriches a decoded work item.
    ///
    /// # Errors
    ///
    /// Returns `EnrichError::Compute` when the score or any statistic is not
    /// finite (e.g. the inputs overflow `f64`).
    pub fn enrich(&self, item: &ProcessedWorkItem) -> Result<EnrichedWorkItem, EnrichError> {
        let start = Instant::now();

        let eigenvalues = group_statistics(&item.normalized_vectors);
        let matrix_score: f64 = item
            .transposed_matrix
            .rows
            .iter()
            .flat_map(|row| row.values.iter())
            .sum();
        let mean = global_mean(&item.normalized_vectors);
        let score = self.accumulate_score(item.checksum + matrix_score + mean);

        if !score.is_finite() {
            return Err(EnrichError::Compute {
                id: item.id.clone(),
                field: "score",
            });
        }
        if eigenvalues.iter().any(|v| !v.is_finite()) {
            return Err(EnrichError::Compute {
                id: item.id.clone(),
                field: "eigenvalues",
            });
        }

        Ok(EnrichedWorkItem {
            id: item.id.clone(),
            eigenvalues,
            score,
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Enriches `item` and returns a copy of `event` whose payload is the
    /// encoded [`EnrichedWorkItem`], tagged as compute-heavy.
    ///
    /// # Errors
    ///
    /// Returns `EnrichError::Compute` or `EnrichError::Encode`.
    pub fn enrich_event(
        &self,
        event: RawEvent,
        item: &ProcessedWorkItem,
    ) -> Result<EnrichedEvent, EnrichError> {
        let enriched = self.enrich(item)?;
        let payload = serde_json::to_string(&enriched).map_err(EnrichError::Encode)?;
        let event = RawEvent { payload, ..event };
        Ok(EnrichedEvent::admitted(
            event,
            WORKLOAD_TAG_KEY,
            WORKLOAD_TAG_VALUE,
        ))
    }

    /// Decodes, enriches and re-encodes a raw payload.
    ///
    /// # Errors
    ///
    /// Returns any `EnrichError` variant.
    pub fn enrich_payload(&self, payload: &str) -> Result<String, EnrichError> {
        let item = ProcessedWorkItem::decode(payload)?;
        let enriched = self.enrich(&item)?;
        serde_json::to_string(&enriched).map_err(EnrichError::Encode)
    }

    /// `sum_{i < iterations} base * (i + 1) * SCORE_SCALE`, evaluated term by
    /// term. `black_box` keeps the loop from being folded into a closed form.
    fn accumulate_score(&self, base: f64) -> f64 {
        let mut score = 0.0;
        for i in 0..self.iterations {
            score += black_box(base) * (f64::from(i) + 1.0) * SCORE_SCALE;
        }
        score
    }
}

/// `(variance, mean)` of each vector group, flattened and capped at
/// [`MAX_EIGENVALUES`] entries.
fn group_statistics(vectors: &[Vector]) -> Vec<f64> {
    vectors
        .iter()
        .flat_map(|v| {
            let (mean, variance) = mean_variance(&v.values);
            [variance, mean]
        })
        .take(MAX_EIGENVALUES)
        .collect()
}

/// Population mean and variance; `(0, 0)` for an empty slice.
#[allow(clippy::cast_precision_loss)]
fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

#[allow(clippy::cast_precision_loss)]
fn global_mean(vectors: &[Vector]) -> f64 {
    let (sum, count) = vectors
        .iter()
        .flat_map(|v| v.values.iter())
        .fold((0.0, 0usize), |(sum, count), x| (sum + x, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, vectors: Vec<Vec<f64>>, rows: Vec<Vec<f64>>, checksum: f64) -> ProcessedWorkItem {
        ProcessedWorkItem {
            id: id.to_string(),
            normalized_vectors: vectors.into_iter().map(Vector::from).collect(),
            transposed_matrix: Matrix {
                rows: rows.into_iter().map(Vector::from).collect(),
            },
            checksum,
        }
    }

    /// Closed form of the score loop, for comparison only.
    fn expected_score(base: f64, iterations: u32) -> f64 {
        let n = f64::from(iterations);
        base * SCORE_SCALE * n * (n + 1.0) / 2.0
    }

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn reference_item_scores_deterministically() {
        let w1 = item("w1", vec![vec![1.0, 2.0, 3.0]], vec![], 2.0);
        let enriched = WorkItemEnricher::new(500).enrich(&w1).unwrap();

        assert_eq!(enriched.id, "w1");
        // base = checksum 2 + matrix 0 + mean 2
        assert!(approx_eq(enriched.score, expected_score(4.0, 500)));
        assert!(approx_eq(enriched.score, 501.0));
        assert_eq!(enriched.eigenvalues.len(), 2);
        assert!(approx_eq(enriched.eigenvalues[0], 2.0 / 3.0));
        assert!(approx_eq(enriched.eigenvalues[1], 2.0));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let it = item(
            "w2",
            vec![vec![0.1, 0.7], vec![0.3, 0.3, 0.9]],
            vec![vec![1.5, -0.5], vec![2.0]],
            0.25,
        );
        let enricher = WorkItemEnricher::new(250);
        let a = enricher.enrich(&it).unwrap();
        let b = enricher.enrich(&it).unwrap();
        assert_eq!(a.score.to_bits(), b.score.to_bits());
        assert_eq!(a.eigenvalues, b.eigenvalues);
    }

    #[test]
    fn empty_vectors_produce_no_eigenvalues_and_zero_mean() {
        let it = item("empty", vec![], vec![vec![1.0, 1.0]], 1.0);
        let enriched = WorkItemEnricher::new(10).enrich(&it).unwrap();
        assert!(enriched.eigenvalues.is_empty());
        // base = checksum 1 + matrix 2 + mean 0
        assert!(approx_eq(enriched.score, expected_score(3.0, 10)));
    }

    #[test]
    fn empty_group_contributes_zero_statistics() {
        let it = item("g", vec![vec![], vec![4.0]], vec![], 0.0);
        let enriched = WorkItemEnricher::new(1).enrich(&it).unwrap();
        assert_eq!(enriched.eigenvalues, vec![0.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn eigenvalues_are_capped_at_ten_entries() {
        let vectors = (0..8).map(|i| vec![f64::from(i), f64::from(i) + 2.0]).collect();
        let it = item("many", vectors, vec![], 0.0);
        let enriched = WorkItemEnricher::new(1).enrich(&it).unwrap();
        assert_eq!(enriched.eigenvalues.len(), MAX_EIGENVALUES);
        // Fifth group is [4, 6]: variance 1, mean 5.
        assert!(approx_eq(enriched.eigenvalues[8], 1.0));
        assert!(approx_eq(enriched.eigenvalues[9], 5.0));
    }

    #[test]
    fn group_means_differ_from_global_mean() {
        // Groups [0, 0] and [6]: global mean 2, group means 0 and 6.
        let it = item("m", vec![vec![0.0, 0.0], vec![6.0]], vec![], 0.0);
        let enriched = WorkItemEnricher::new(3).enrich(&it).unwrap();
        assert_eq!(enriched.eigenvalues, vec![0.0, 0.0, 0.0, 6.0]);
        assert!(approx_eq(enriched.score, expected_score(2.0, 3)));
    }

    #[test]
    fn zero_iterations_yield_zero_score() {
        let it = item("z", vec![vec![5.0]], vec![], 10.0);
        let enriched = WorkItemEnricher::new(0).enrich(&it).unwrap();
        assert_eq!(enriched.score, 0.0);
    }

    #[test]
    fn overflowing_inputs_are_a_compute_error() {
        let it = item("big", vec![vec![f64::MAX, f64::MAX]], vec![], 0.0);
        let err = WorkItemEnricher::new(5).enrich(&it).unwrap_err();
        assert!(matches!(err, EnrichError::Compute { .. }));
        assert_eq!(err.kind(), "compute");
    }

    #[test]
    fn decode_accepts_camel_and_snake_case() {
        let camel = r#"{"id":"a","normalizedVectors":[{"values":[1]}],"transposedMatrix":{"rows":[]},"checksum":2}"#;
        let snake = r#"{"id":"a","normalized_vectors":[{"values":[1]}],"transposed_matrix":{"rows":[]},"checksum":2}"#;
        assert_eq!(
            ProcessedWorkItem::decode(camel).unwrap(),
            ProcessedWorkItem::decode(snake).unwrap()
        );
    }

    #[test]
    fn decode_defaults_missing_matrix_and_checksum() {
        let it = ProcessedWorkItem::decode(r#"{"id":"only-id"}"#).unwrap();
        assert!(it.normalized_vectors.is_empty());
        assert!(it.transposed_matrix.rows.is_empty());
        assert_eq!(it.checksum, 0.0);
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        for payload in ["", "not json", r#"{"normalizedVectors":[]}"#, r#"{"id":"x","checksum":"high"}"#] {
            let err = ProcessedWorkItem::decode(payload).unwrap_err();
            assert_eq!(err.kind(), "decode", "payload {payload:?}");
        }
    }

    #[test]
    fn enrich_event_replaces_payload_and_tags_workload() {
        let it = item("w1", vec![vec![1.0, 2.0, 3.0]], vec![], 2.0);
        let event = RawEvent::new(crate::event::WORK_ITEM_KIND, 0_i64, it.encode().unwrap()).with_sequence(9);

        let enriched = WorkItemEnricher::new(500).enrich_event(event, &it).unwrap();

        assert!(enriched.passed);
        assert_eq!(enriched.tag(WORKLOAD_TAG_KEY), Some(WORKLOAD_TAG_VALUE));
        assert_eq!(enriched.event.sequence, 9);
        let decoded: EnrichedWorkItem = serde_json::from_str(&enriched.event.payload).unwrap();
        assert_eq!(decoded.id, "w1");
        assert!(approx_eq(decoded.score, 501.0));
    }

    #[test]
    fn enrich_payload_emits_camel_case_fields() {
        let out = WorkItemEnricher::new(1)
            .enrich_payload(r#"{"id":"p","normalizedVectors":[{"values":[2,2]}],"checksum":0}"#)
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["id"], "p");
        assert!(json.get("processingTimeMs").is_some());
        assert_eq!(json["eigenvalues"], serde_json::json!([0.0, 2.0]));
    }
}
