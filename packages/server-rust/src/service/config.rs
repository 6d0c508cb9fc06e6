//! Stage configuration: rule parameters, enrichment cost and stream limits.

use sieve_core::rules::EXCLUDED_KIND;
use sieve_core::{DEFAULT_ITERATIONS, MIN_VALUE};

/// Stage-level configuration for stream dispatch.
///
/// Controls the admission rule, the enrichment cost, stream concurrency and
/// how often server-wide totals are reported.
#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Name used in metrics summaries and log lines.
    pub service_name: String,
    /// Smallest event value admitted by the rule.
    pub min_value: i64,
    /// Event kind that is never admitted.
    pub excluded_kind: String,
    /// Iteration count of the work-item score loop.
    pub enrich_iterations: u32,
    /// Maximum number of streams processed at once. Further streams wait.
    pub max_concurrent_streams: usize,
    /// Interval between server-wide metrics reports in milliseconds.
    pub report_interval_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            service_name: "rules-service".to_string(),
            min_value: MIN_VALUE,
            excluded_kind: EXCLUDED_KIND.to_string(),
            enrich_iterations: DEFAULT_ITERATIONS,
            max_concurrent_streams: 8,
            report_interval_ms: 10_000,
        }
    }
}
