//! Batch-mode dispatcher: filters an arrival group with the admission rule.

use std::sync::Arc;
use std::time::Instant;

use sieve_core::{
    ApplyRulesBatchRequest, ApplyRulesBatchResponse, EnrichedEvent, MetricsAccumulator,
    RuleEvaluator,
};
use tracing::{debug, trace};

use super::operation::{DispatchError, DispatchState, StreamMode};
use super::stream::StreamHandler;

/// Applies the admission rule to every event of a batch. Work items get no
/// special treatment here.
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    rules: Arc<RuleEvaluator>,
}

impl BatchDispatcher {
    #[must_use]
    pub fn new(rules: Arc<RuleEvaluator>) -> Self {
        Self { rules }
    }
}

impl StreamHandler for BatchDispatcher {
    type Request = ApplyRulesBatchRequest;
    type Output = Vec<EnrichedEvent>;
    type Response = ApplyRulesBatchResponse;

    fn mode(&self) -> StreamMode {
        StreamMode::Batch
    }

    fn handle(
        &mut self,
        request: ApplyRulesBatchRequest,
        received_at: Instant,
        metrics: &mut MetricsAccumulator,
    ) -> Result<Option<Vec<EnrichedEvent>>, DispatchError> {
        if request.events.is_empty() {
            debug!("empty batch skipped");
            return Ok(None);
        }
        metrics.record_recv(received_at.elapsed());
        let size = request.events.len();
        trace!(state = DispatchState::Received.as_str(), size);

        let start = Instant::now();
        let survivors = request
            .events
            .iter()
            .filter_map(|event| self.rules.evaluate(event).transpose())
            .collect::<Result<Vec<_>, _>>();
        metrics.record_processing_count(start.elapsed(), size as u64);

        let survivors = survivors?;
        trace!(
            state = DispatchState::Processed.as_str(),
            size,
            survivors = survivors.len()
        );
        Ok((!survivors.is_empty()).then_some(survivors))
    }

    fn respond(events: Vec<EnrichedEvent>) -> ApplyRulesBatchResponse {
        ApplyRulesBatchResponse { events }
    }

    fn emitted_count(events: &Vec<EnrichedEvent>) -> u64 {
        events.len() as u64
    }
}
