//! Condition management helpers following Kubernetes API conventions

use chrono::Utc;

use crate::crd::Condition;

/// Standard condition types following Kubernetes conventions
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Standard condition statuses
pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the status changes, so re-applying
/// the same condition leaves the list byte-for-byte unchanged.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
    observed_generation: Option<i64>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status {
            existing.last_transition_time = Utc::now().to_rfc3339();
        }

        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        existing.observed_generation = observed_generation;
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation,
        });
    }
}
