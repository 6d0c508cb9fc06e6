//! Event classification: splits incoming events into rule-path events and
//! decoded work items before any processing happens.

use sieve_core::{EnrichError, ProcessedWorkItem, RawEvent};

/// An event tagged with the path it takes through the stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    /// Evaluated by the admission rule.
    Normal(RawEvent),
    /// Enriched unconditionally. `item` is the decoded payload.
    WorkItem {
        event: RawEvent,
        item: ProcessedWorkItem,
    },
}

impl ClassifiedEvent {
    /// Branch label for structured logs.
    #[must_use]
    pub fn branch(&self) -> &'static str {
        match self {
            Self::Normal(_) => "rule",
            Self::WorkItem { .. } => "work_item",
        }
    }

    #[must_use]
    pub fn event(&self) -> &RawEvent {
        match self {
            Self::Normal(event) | Self::WorkItem { event, .. } => event,
        }
    }
}

/// Classifies one event.
///
/// Events of kind `work-item` have their payload decoded here so the
/// enrichment step only ever sees well-formed items.
///
/// # Errors
///
/// Returns `EnrichError::Decode` if a work item's payload is malformed. The
/// caller drops such events without ending the stream.
pub fn classify(event: RawEvent) -> Result<ClassifiedEvent, EnrichError> {
    if !event.is_work_item() {
        return Ok(ClassifiedEvent::Normal(event));
    }
    let item = ProcessedWorkItem::decode(&event.payload)?;
    Ok(ClassifiedEvent::WorkItem { event, item })
}
