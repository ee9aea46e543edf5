// SPDX-License-Identifier: GPL-3.0-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status condition carried by the owner resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorCondition {
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl OperatorCondition {
    pub fn new(
        type_: impl Into<String>,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

/// Insert or update the condition of the same type. The transition time moves
/// only when the status flips. Returns whether anything changed.
pub fn set_condition(
    conditions: &mut Vec<OperatorCondition>,
    mut condition: OperatorCondition,
    now: DateTime<Utc>,
) -> bool {
    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) else {
        condition.last_transition_time = Some(now);
        conditions.push(condition);
        return true;
    };

    if existing.status != condition.status {
        condition.last_transition_time = Some(now);
    } else {
        condition.last_transition_time = existing.last_transition_time.or(Some(now));
    }
    if *existing == condition {
        return false;
    }
    *existing = condition;
    true
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn transition_time_moves_only_on_status_change() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 10, 0).unwrap();
        let mut conditions = Vec::new();

        assert!(set_condition(
            &mut conditions,
            OperatorCondition::new("Available", false, "DevicesPending", "0 of 2 devices provisioned"),
            t0,
        ));
        assert!(!set_condition(
            &mut conditions,
            OperatorCondition::new("Available", false, "DevicesPending", "0 of 2 devices provisioned"),
            t1,
        ));
        assert!(set_condition(
            &mut conditions,
            OperatorCondition::new("Available", false, "DevicesPending", "1 of 2 devices provisioned"),
            t1,
        ));
        assert_eq!(conditions[0].last_transition_time, Some(t0));

        assert!(set_condition(
            &mut conditions,
            OperatorCondition::new("Available", true, "DevicesProvisioned", "2 of 2 devices provisioned"),
            t2,
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].last_transition_time, Some(t2));
    }
}
