//! Admission rule for normal (non work-item) events.

use crate::event::{EnrichedEvent, RawEvent};

/// Smallest value an event may carry and still be admitted.
pub const MIN_VALUE: i64 = 10;

/// Events of this kind are never admitted.
pub const EXCLUDED_KIND: &str = "view";

pub const RULE_TAG_KEY: &str = "rule";
pub const RULE_TAG_VALUE: &str = "min_value_and_type";

/// Contract violations raised by the rule evaluator.
///
/// These indicate a schema mismatch with the upstream stage rather than an
/// event that is legitimately excluded, so callers surface them instead of
/// dropping the event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("event of kind {kind:?} has non-numeric value {value}")]
    NonNumericValue { kind: String, value: String },
}

/// Decides whether a normal event passes this stage.
///
/// Admits iff `value >= min_value` and `kind != excluded_kind`. Pure and
/// `Sync`; one instance is shared by every stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEvaluator {
    min_value: i64,
    excluded_kind: String,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(MIN_VALUE, EXCLUDED_KIND)
    }
}

impl RuleEvaluator {
    pub fn new(min_value: i64, excluded_kind: impl Into<String>) -> Self {
        Self {
            min_value,
            excluded_kind: excluded_kind.into(),
        }
    }

    /// Evaluates the admission rule.
    ///
    /// Returns `Ok(Some(_))` with the `rule` tag attached when the event
    /// passes and `Ok(None)` when it is rejected.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::NonNumericValue` if the value cannot be read as an
    /// integer.
    pub fn evaluate(&self, event: &RawEvent) -> Result<Option<EnrichedEvent>, RuleError> {
        let value = event
            .value
            .as_integer()
            .ok_or_else(|| RuleError::NonNumericValue {
                kind: event.kind.clone(),
                value: event.value.to_string(),
            })?;

        if value < self.min_value || event.kind == self.excluded_kind {
            return Ok(None);
        }

        Ok(Some(EnrichedEvent::admitted(
            event.clone(),
            RULE_TAG_KEY,
            RULE_TAG_VALUE,
        )))
    }
}
