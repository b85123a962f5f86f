use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lifecycle states of an [`OrderProposal`] (spec §3).
///
/// Terminal states are absorbing: [`OrderState::is_terminal`] governs both
/// the proposal store's eviction policy and the state machine's transition
/// guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    Proposed,
    Simulated,
    RiskApproved,
    RiskRejected,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    Submitted,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::RiskRejected
                | OrderState::ApprovalDenied
                | OrderState::Filled
                | OrderState::Cancelled
                | OrderState::Rejected
        )
    }
}

/// Immutable order proposal. All transitions produce a new value via
/// [`OrderProposal::with_state`]; nothing mutates a proposal in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProposal {
    pub proposal_id: String,
    pub correlation_id: String,

    pub intent_json: String,
    pub simulation_json: Option<String>,
    pub risk_decision_json: Option<String>,

    pub state: OrderState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub approval_token_id: Option<String>,
    pub approval_reason: Option<String>,
    pub broker_order_id: Option<String>,
}

impl OrderProposal {
    pub fn new(
        proposal_id: String,
        correlation_id: String,
        intent_json: String,
        state: OrderState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            proposal_id,
            correlation_id,
            intent_json,
            simulation_json: None,
            risk_decision_json: None,
            state,
            created_at: now,
            updated_at: now,
            approval_token_id: None,
            approval_reason: None,
            broker_order_id: None,
        }
    }

    /// SHA-256 over `intent_json`, hex-encoded. The anti-tamper binding
    /// between a token and the payload it authorizes.
    pub fn intent_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.intent_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Build the successor proposal for a state transition, stamping
    /// `updated_at`. Does not enforce the transition is legal — callers
    /// (the approval service, order submitter) check preconditions first.
    pub fn with_state(&self, new_state: OrderState, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.state = new_state;
        next.updated_at = now;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_hash_is_stable_for_identical_json() {
        let now = Utc::now();
        let a = OrderProposal::new(
            "p1".into(),
            "c1".into(),
            r#"{"symbol":"AAPL"}"#.into(),
            OrderState::Proposed,
            now,
        );
        let b = OrderProposal::new(
            "p2".into(),
            "c2".into(),
            r#"{"symbol":"AAPL"}"#.into(),
            OrderState::Proposed,
            now,
        );
        assert_eq!(a.intent_hash(), b.intent_hash());
    }

    #[test]
    fn terminal_states_are_absorbing_by_definition() {
        for s in [
            OrderState::RiskRejected,
            OrderState::ApprovalDenied,
            OrderState::Filled,
            OrderState::Cancelled,
            OrderState::Rejected,
        ] {
            assert!(s.is_terminal());
        }
        for s in [
            OrderState::Proposed,
            OrderState::Simulated,
            OrderState::RiskApproved,
            OrderState::ApprovalRequested,
            OrderState::ApprovalGranted,
            OrderState::Submitted,
        ] {
            assert!(!s.is_terminal());
        }
    }
}
