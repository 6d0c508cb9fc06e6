//! Sieve core: event model, admission rule, work-item enrichment and
//! per-stream metrics. Synchronous and I/O-free; the server crate drives it.

pub mod event;
pub mod messages;
pub mod metrics;
pub mod rules;
pub mod workitem;

pub use event::{EnrichedEvent, EventValue, RawEvent, WORK_ITEM_KIND};
pub use messages::{
    ApplyRulesBatchRequest, ApplyRulesBatchResponse, ApplyRulesRequest, ApplyRulesResponse,
    CodecError, EncodedFrame, WireFormat,
};
pub use metrics::{MetricsAccumulator, MetricsSummary, PhaseSummary};
pub use rules::{RuleError, RuleEvaluator, MIN_VALUE};
pub use workitem::{
    EnrichError, EnrichedWorkItem, Matrix, ProcessedWorkItem, Vector, WorkItemEnricher,
    DEFAULT_ITERATIONS,
};
