use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::application::feature_flags::FeatureFlagValues;
use crate::application::policy_evaluator::PolicyEvaluator;
use crate::application::proposal_store::ProposalStore;
use crate::domain::errors::{ControlPlaneError, ControlPlaneResult};
use crate::domain::policy::{AutoApprovalPolicy, DayOfWeek, PolicyContext};
use crate::domain::proposal::{OrderProposal, OrderState};
use crate::domain::token::ApprovalToken;
use crate::domain::types::{OrderIntent, SimulationResult};

/// State transitions on a proposal plus the single-use token protocol
/// (spec §4.2). Holds no state of its own beyond the shared [`ProposalStore`].
pub struct ApprovalService {
    store: Arc<ProposalStore>,
}

impl ApprovalService {
    pub fn new(store: Arc<ProposalStore>) -> Self {
        Self { store }
    }

    fn require_state(
        proposal: &OrderProposal,
        expected: OrderState,
    ) -> ControlPlaneResult<()> {
        if proposal.state != expected {
            return Err(ControlPlaneError::StateError {
                proposal_id: proposal.proposal_id.clone(),
                actual: proposal.state,
                expected,
            });
        }
        Ok(())
    }

    fn mint_token(&self, proposal: &OrderProposal, now: DateTime<Utc>) -> ApprovalToken {
        let token = ApprovalToken::mint(
            Uuid::new_v4().to_string(),
            proposal.proposal_id.clone(),
            proposal.intent_hash(),
            now,
            self.store.token_ttl,
        );
        self.store.insert_token(token.clone());
        token
    }

    /// Evaluate auto-approval eligibility and either auto-grant (minting a
    /// token directly) or move the proposal to manual review.
    pub fn request_approval(
        &self,
        proposal_id: &str,
        flags: &FeatureFlagValues,
        kill_switch_active: bool,
        policy: Option<&AutoApprovalPolicy>,
        now: DateTime<Utc>,
    ) -> ControlPlaneResult<(OrderProposal, Option<ApprovalToken>)> {
        let proposal = self
            .store
            .get(proposal_id)
            .ok_or_else(|| ControlPlaneError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            })?;
        Self::require_state(&proposal, OrderState::RiskApproved)?;

        let (auto_approved, reason) =
            self.evaluate_auto_approval(&proposal, flags, kill_switch_active, policy, now);

        let mut updated = proposal.with_state(
            if auto_approved {
                OrderState::ApprovalGranted
            } else {
                OrderState::ApprovalRequested
            },
            now,
        );
        updated.approval_reason = Some(reason);

        let token = if auto_approved {
            let token = self.mint_token(&updated, now);
            updated.approval_token_id = Some(token.token_id.clone());
            Some(token)
        } else {
            None
        };

        self.store.update(updated.clone())?;
        Ok((updated, token))
    }

    fn evaluate_auto_approval(
        &self,
        proposal: &OrderProposal,
        flags: &FeatureFlagValues,
        kill_switch_active: bool,
        policy: Option<&AutoApprovalPolicy>,
        now: DateTime<Utc>,
    ) -> (bool, String) {
        if !flags.auto_approval || kill_switch_active {
            return (false, "Manual approval required".to_string());
        }

        let Some(simulation_json) = &proposal.simulation_json else {
            return (
                false,
                "Parse error: missing simulation result".to_string(),
            );
        };
        let simulation: SimulationResult = match serde_json::from_str(simulation_json) {
            Ok(s) => s,
            Err(e) => return (false, format!("Parse error: {e}")),
        };

        let notional = simulation.gross_notional;
        let threshold = rust_decimal::Decimal::try_from(flags.auto_approval_max_notional)
            .unwrap_or(rust_decimal::Decimal::MAX);
        if notional > threshold {
            return (
                false,
                format!("Notional ${notional} exceeds threshold ${threshold}"),
            );
        }

        let Some(policy) = policy else {
            return (true, "Auto-approved (below threshold)".to_string());
        };

        let intent: OrderIntent = match serde_json::from_str(&proposal.intent_json) {
            Ok(i) => i,
            Err(e) => return (false, format!("Parse error: {e}")),
        };

        let day_of_week = DayOfWeek::from_chrono(now.weekday());
        let ctx = PolicyContext {
            symbol: &intent.symbol,
            sec_type: sec_type_str(intent.sec_type),
            side: intent.side,
            order_type: intent.order_type,
            notional: notional_to_f64(notional),
            now_local: now.time(),
            day_of_week,
            portfolio_nav: None,
        };

        let (ok, reasons) = PolicyEvaluator::new(policy).check_all(&ctx);
        if ok {
            (true, "Auto-approved (below threshold, policy passed)".to_string())
        } else {
            (false, format!("Policy: {}", reasons.join(", ")))
        }
    }

    pub fn grant_approval(
        &self,
        proposal_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ControlPlaneResult<(OrderProposal, ApprovalToken)> {
        let proposal = self
            .store
            .get(proposal_id)
            .ok_or_else(|| ControlPlaneError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            })?;
        Self::require_state(&proposal, OrderState::ApprovalRequested)?;

        let mut updated = proposal.with_state(OrderState::ApprovalGranted, now);
        let token = self.mint_token(&updated, now);
        updated.approval_token_id = Some(token.token_id.clone());
        updated.approval_reason = reason;

        self.store.update(updated.clone())?;
        Ok((updated, token))
    }

    pub fn deny_approval(
        &self,
        proposal_id: &str,
        reason: String,
        now: DateTime<Utc>,
    ) -> ControlPlaneResult<OrderProposal> {
        let proposal = self
            .store
            .get(proposal_id)
            .ok_or_else(|| ControlPlaneError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            })?;
        Self::require_state(&proposal, OrderState::ApprovalRequested)?;

        let mut updated = proposal.with_state(OrderState::ApprovalDenied, now);
        updated.approval_reason = Some(reason);
        self.store.update(updated.clone())?;
        Ok(updated)
    }

    pub fn validate_token(&self, token_id: &str, expected_intent_hash: &str, now: DateTime<Utc>) -> bool {
        self.store.validate_token(token_id, expected_intent_hash, now)
    }

    pub fn consume_token(&self, token_id: &str, now: DateTime<Utc>) -> ControlPlaneResult<ApprovalToken> {
        self.store.consume_token(token_id, now)
    }
}

fn sec_type_str(sec_type: crate::domain::types::SecType) -> &'static str {
    use crate::domain::types::SecType::*;
    match sec_type {
        Stk => "STK",
        Etf => "ETF",
        Fut => "FUT",
        Opt => "OPT",
        Fx => "FX",
        Crypto => "CRYPTO",
    }
}

fn notional_to_f64(d: rust_decimal::Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(0.0)
}
