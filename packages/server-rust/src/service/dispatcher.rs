//! Event-mode dispatcher: one request in, at most one response out.

use std::sync::Arc;
use std::time::Instant;

use sieve_core::{
    ApplyRulesRequest, ApplyRulesResponse, EnrichedEvent, MetricsAccumulator, RawEvent,
    RuleError, RuleEvaluator, WorkItemEnricher,
};
use tracing::{debug, trace, warn};

use super::classify::{classify, ClassifiedEvent};
use super::operation::{DispatchError, DispatchState, StreamMode};
use super::stream::StreamHandler;

/// Routes each event to the admission rule or the work-item enricher.
///
/// Absent events are dropped before any timing starts. Malformed or
/// non-computable work items are dropped with a warning. A non-numeric value
/// on the rule path ends the stream.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    rules: Arc<RuleEvaluator>,
    enricher: WorkItemEnricher,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(rules: Arc<RuleEvaluator>, enricher: WorkItemEnricher) -> Self {
        Self { rules, enricher }
    }

    /// Processes one present event.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::NonNumericValue` from the rule path.
    pub fn process(&self, event: RawEvent) -> Result<Option<EnrichedEvent>, RuleError> {
        let sequence = event.sequence;
        let classified = match classify(event) {
            Ok(classified) => classified,
            Err(e) => {
                warn!(sequence, error = %e, kind = e.kind(), "dropping undecodable work item");
                return Ok(None);
            }
        };
        trace!(
            state = DispatchState::Classified.as_str(),
            branch = classified.branch(),
            sequence
        );

        match classified {
            ClassifiedEvent::Normal(event) => self.rules.evaluate(&event),
            ClassifiedEvent::WorkItem { event, item } => {
                match self.enricher.enrich_event(event, &item) {
                    Ok(enriched) => Ok(Some(enriched)),
                    Err(e) => {
                        warn!(sequence, id = %item.id, error = %e, kind = e.kind(), "dropping work item");
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl StreamHandler for EventDispatcher {
    type Request = ApplyRulesRequest;
    type Output = EnrichedEvent;
    type Response = ApplyRulesResponse;

    fn mode(&self) -> StreamMode {
        StreamMode::Event
    }

    fn handle(
        &mut self,
        request: ApplyRulesRequest,
        received_at: Instant,
        metrics: &mut MetricsAccumulator,
    ) -> Result<Option<EnrichedEvent>, DispatchError> {
        let Some(event) = request.event else {
            debug!("request without event dropped");
            return Ok(None);
        };
        metrics.record_recv(received_at.elapsed());
        trace!(state = DispatchState::Received.as_str(), sequence = event.sequence);

        let start = Instant::now();
        let result = self.process(event);
        metrics.record_processing(start.elapsed());
        trace!(
            state = DispatchState::Processed.as_str(),
            admitted = matches!(result, Ok(Some(_)))
        );

        result.map_err(DispatchError::from)
    }

    fn respond(event: EnrichedEvent) -> ApplyRulesResponse {
        ApplyRulesResponse { event }
    }
}
