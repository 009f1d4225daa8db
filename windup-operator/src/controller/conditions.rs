//! Status conditions on the Windup resource.

use crate::crd::{ConditionStatus, WindupCondition};

/// Every managed resource is applied and ready.
pub const CONDITION_READY: &str = "Ready";
/// The operator is still converging.
pub const CONDITION_PROGRESSING: &str = "Progressing";

pub const REASON_READY: &str = "AllResourcesReady";
pub const REASON_WAITING: &str = "WaitingForResources";
pub const REASON_RECONCILING: &str = "Reconciling";
pub const REASON_FAILED: &str = "ReconcileFailed";
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Insert or update the condition of type `condition_type`.
///
/// At most one condition per type is kept. `lastTransitionTime` is only
/// moved when the status changes; reason and message are always refreshed.
pub fn upsert_condition(
    conditions: &mut Vec<WindupCondition>,
    condition_type: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
    now: &str,
) {
    let mut existing = None;
    conditions.retain(|c| {
        if c.condition_type != condition_type {
            return true;
        }
        if existing.is_none() {
            existing = Some(c.clone());
        }
        false
    });

    let last_transition_time = match existing {
        Some(previous) if previous.status == status => previous
            .last_transition_time
            .or_else(|| Some(now.to_string())),
        _ => Some(now.to_string()),
    };

    conditions.push(WindupCondition {
        condition_type: condition_type.to_string(),
        status,
        reason: Some(reason.to_string()),
        message: Some(message.into()),
        last_transition_time,
    });
    conditions.sort_by(|a, b| a.condition_type.cmp(&b.condition_type));
}

/// Find a condition by type.
pub fn find_condition<'a>(
    conditions: &'a [WindupCondition],
    condition_type: &str,
) -> Option<&'a WindupCondition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}
