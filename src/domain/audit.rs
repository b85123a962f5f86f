use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    OrderSubmitted,
    OrderSubmissionFailed,
    OrderFilled,
    OrderCancelled,
    OrderRejected,
    OrderPollingError,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ReconciliationDiscrepancy,
    KillSwitchActivated,
    KillSwitchDeactivated,
    ErrorOccurred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub correlation_id: String,
    pub data: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        correlation_id: impl Into<String>,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            correlation_id: correlation_id.into(),
            data,
            recorded_at: now,
        }
    }
}
