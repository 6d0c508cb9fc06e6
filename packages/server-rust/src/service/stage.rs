//! Shared per-process dispatch state that every stream draws from.

use std::sync::Arc;

use sieve_core::{RuleEvaluator, WorkItemEnricher};

use super::aggregate::StreamClosed;
use super::batch::BatchDispatcher;
use super::config::StageConfig;
use super::dispatcher::EventDispatcher;
use super::pool::StreamPool;
use super::worker::TaskSender;

/// Everything a stream needs to be dispatched, shared by all streams.
///
/// Cloning is cheap: the rule evaluator and config are behind `Arc`, the
/// enricher is `Copy` and the pool and sink are handles.
#[derive(Clone)]
pub struct Stage {
    config: Arc<StageConfig>,
    rules: Arc<RuleEvaluator>,
    enricher: WorkItemEnricher,
    pool: StreamPool,
    metrics_sink: Option<TaskSender<StreamClosed>>,
}

impl Stage {
    #[must_use]
    pub fn new(config: StageConfig, metrics_sink: Option<TaskSender<StreamClosed>>) -> Self {
        let rules = Arc::new(RuleEvaluator::new(
            config.min_value,
            config.excluded_kind.clone(),
        ));
        let enricher = WorkItemEnricher::new(config.enrich_iterations);
        let pool = StreamPool::new(config.max_concurrent_streams);
        Self {
            config: Arc::new(config),
            rules,
            enricher,
            pool,
            metrics_sink,
        }
    }

    #[must_use]
    pub fn event_dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(Arc::clone(&self.rules), self.enricher)
    }

    #[must_use]
    pub fn batch_dispatcher(&self) -> BatchDispatcher {
        BatchDispatcher::new(Arc::clone(&self.rules))
    }

    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &StreamPool {
        &self.pool
    }

    #[must_use]
    pub fn metrics_sink(&self) -> Option<&TaskSender<StreamClosed>> {
        self.metrics_sink.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use sieve_core::RawEvent;

    use super::*;

    #[test]
    fn dispatchers_follow_config() {
        let stage = Stage::new(
            StageConfig {
                min_value: 100,
                max_concurrent_streams: 3,
                ..StageConfig::default()
            },
            None,
        );
        assert_eq!(stage.pool().capacity(), 3);
        assert!(stage.metrics_sink().is_none());

        let out = stage
            .event_dispatcher()
            .process(RawEvent::new("click", 50_i64, ""))
            .unwrap();
        assert!(out.is_none());
    }
}
