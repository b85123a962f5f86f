use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::application::approval_service::ApprovalService;
use crate::application::feature_flags::FeatureFlagValues;
use crate::application::proposal_store::ProposalStore;
use crate::config::LiveGuardrails;
use crate::domain::audit::{AuditEvent, AuditEventType};
use crate::domain::errors::{ControlPlaneError, ControlPlaneResult};
use crate::domain::ports::{AuditSink, BrokerPort};
use crate::domain::proposal::OrderState;
use crate::domain::types::{OrderIntent, SimulationResult};

/// Binds token consumption to broker dispatch, then tracks the order to a
/// terminal broker status (spec §4.4).
///
/// Token consumption happens before the broker call so that the
/// lock-protected commit point precedes the unprotected I/O (spec §9).
pub struct OrderSubmitter {
    store: Arc<ProposalStore>,
    approval: Arc<ApprovalService>,
    broker: Arc<dyn BrokerPort>,
    audit: Arc<dyn AuditSink>,
    readonly_mode: bool,
    live_guardrails: LiveGuardrails,
}

impl OrderSubmitter {
    pub fn new(
        store: Arc<ProposalStore>,
        approval: Arc<ApprovalService>,
        broker: Arc<dyn BrokerPort>,
        audit: Arc<dyn AuditSink>,
        readonly_mode: bool,
        live_guardrails: LiveGuardrails,
    ) -> Self {
        Self {
            store,
            approval,
            broker,
            audit,
            readonly_mode,
            live_guardrails,
        }
    }

    async fn emit(&self, event_type: AuditEventType, correlation_id: &str, data: serde_json::Value) {
        let event = AuditEvent::new(event_type, correlation_id, data, Utc::now());
        // Best-effort: a failed audit write must never roll back the business transaction.
        if let Err(e) = self.audit.append(event).await {
            tracing::warn!(error = %e, "audit emission failed");
        }
    }

    /// Checks the live-trading guardrails against a parsed intent (spec
    /// §4.14), grounded in `original_source/packages/live_order_validator`'s
    /// `validate_order_for_live`. Only enforced when `live_trading_mode` is
    /// on; paper/simulation submissions are unaffected.
    fn check_live_guardrails(&self, intent: &OrderIntent, notional: rust_decimal::Decimal) -> Result<(), String> {
        let whitelist = &self.live_guardrails.live_symbol_whitelist;
        if !whitelist.is_empty() && !whitelist.iter().any(|s| s.eq_ignore_ascii_case(&intent.symbol)) {
            return Err(format!("symbol {} not in live trading whitelist", intent.symbol));
        }
        if intent.quantity > self.live_guardrails.live_max_order_size {
            return Err(format!(
                "order size {} exceeds limit {}",
                intent.quantity, self.live_guardrails.live_max_order_size
            ));
        }
        if notional > self.live_guardrails.live_max_order_value_usd {
            return Err(format!(
                "order value ${notional} exceeds limit ${}",
                self.live_guardrails.live_max_order_value_usd
            ));
        }
        Ok(())
    }

    pub async fn submit_order(
        &self,
        proposal_id: &str,
        token_id: &str,
        correlation_id: &str,
        flags: &FeatureFlagValues,
    ) -> ControlPlaneResult<crate::domain::ports::BrokerOrder> {
        let now = Utc::now();

        if self.readonly_mode {
            self.emit(
                AuditEventType::OrderSubmissionFailed,
                correlation_id,
                json!({"proposal_id": proposal_id, "reason": "connection is in read-only mode"}),
            )
            .await;
            return Err(ControlPlaneError::ReadOnlyMode);
        }

        let proposal = self
            .store
            .get(proposal_id)
            .ok_or_else(|| ControlPlaneError::ProposalNotFound {
                proposal_id: proposal_id.to_string(),
            })?;
        if proposal.state != OrderState::ApprovalGranted {
            return Err(ControlPlaneError::StateError {
                proposal_id: proposal_id.to_string(),
                actual: proposal.state,
                expected: OrderState::ApprovalGranted,
            });
        }

        if flags.live_trading_mode {
            let intent: OrderIntent = serde_json::from_str(&proposal.intent_json).map_err(|e| {
                ControlPlaneError::SubmitError(format!("invalid OrderIntent: {e}"))
            })?;
            let notional = proposal
                .simulation_json
                .as_deref()
                .and_then(|s| serde_json::from_str::<SimulationResult>(s).ok())
                .map(|s| s.gross_notional)
                .unwrap_or(intent.quantity);
            if let Err(reason) = self.check_live_guardrails(&intent, notional) {
                self.emit(
                    AuditEventType::OrderSubmissionFailed,
                    correlation_id,
                    json!({"proposal_id": proposal_id, "reason": reason}),
                )
                .await;
                return Err(ControlPlaneError::GuardrailViolation(reason));
            }
        }

        let intent_hash = proposal.intent_hash();
        if !self.approval.validate_token(token_id, &intent_hash, now) {
            self.emit(
                AuditEventType::OrderSubmissionFailed,
                correlation_id,
                json!({"proposal_id": proposal_id, "token_id": token_id, "reason": "Invalid or expired token"}),
            )
            .await;
            return Err(ControlPlaneError::TokenInvalid {
                token_id: token_id.to_string(),
            });
        }

        // Commit point: consumption precedes the broker call.
        if let Err(e) = self.approval.consume_token(token_id, now) {
            self.emit(
                AuditEventType::OrderSubmissionFailed,
                correlation_id,
                json!({"proposal_id": proposal_id, "token_id": token_id, "reason": e.to_string()}),
            )
            .await;
            return Err(e);
        }

        let intent: OrderIntent = serde_json::from_str(&proposal.intent_json).map_err(|e| {
            ControlPlaneError::SubmitError(format!("invalid OrderIntent: {e}"))
        })?;
        let token = self
            .store
            .get_token(token_id)
            .ok_or_else(|| ControlPlaneError::SubmitError("token vanished after consumption".into()))?;

        let broker_order = match self.broker.submit_order(&intent, &token).await {
            Ok(o) => o,
            Err(e) => {
                self.emit(
                    AuditEventType::OrderSubmissionFailed,
                    correlation_id,
                    json!({"proposal_id": proposal_id, "token_id": token_id, "reason": e.to_string()}),
                )
                .await;
                // The token remains consumed; the proposal stays APPROVAL_GRANTED
                // (spec §9 open question — no dedicated SUBMIT_FAILED state here).
                return Err(ControlPlaneError::SubmitError(e.to_string()));
            }
        };

        let mut updated = proposal.with_state(OrderState::Submitted, now);
        updated.broker_order_id = Some(broker_order.broker_order_id.clone());
        self.store.update(updated)?;

        self.emit(
            AuditEventType::OrderSubmitted,
            correlation_id,
            json!({
                "proposal_id": proposal_id,
                "token_id": token_id,
                "broker_order_id": broker_order.broker_order_id,
                "symbol": broker_order.symbol,
                "quantity": broker_order.quantity.to_string(),
                "status": broker_order.status,
            }),
        )
        .await;

        Ok(broker_order)
    }

    /// Poll broker status until terminal, updating the proposal and emitting
    /// the matching audit event as each poll completes (spec §4.4).
    pub async fn poll_order_until_terminal(
        &self,
        broker_order_id: &str,
        proposal_id: &str,
        correlation_id: &str,
        max_polls: u32,
        interval: Duration,
    ) -> ControlPlaneResult<crate::domain::ports::BrokerOrder> {
        for poll_count in 0..max_polls {
            match self.broker.get_order_status(broker_order_id).await {
                Ok(order) if order.status.is_terminal() => {
                    if let Some(proposal) = self.store.get(proposal_id) {
                        let new_state = order.status.to_order_state();
                        let updated = proposal.with_state(new_state, Utc::now());
                        self.store.update(updated)?;

                        let event_type = match new_state {
                            OrderState::Filled => AuditEventType::OrderFilled,
                            OrderState::Cancelled => AuditEventType::OrderCancelled,
                            OrderState::Rejected => AuditEventType::OrderRejected,
                            _ => AuditEventType::OrderFilled,
                        };
                        self.emit(
                            event_type,
                            correlation_id,
                            json!({
                                "proposal_id": proposal_id,
                                "broker_order_id": broker_order_id,
                                "status": order.status,
                                "filled_quantity": order.filled_quantity.to_string(),
                            }),
                        )
                        .await;
                    }
                    return Ok(order);
                }
                Ok(_not_terminal) => {
                    if poll_count + 1 < max_polls {
                        tokio::time::sleep(interval).await;
                    }
                }
                Err(e) => {
                    self.emit(
                        AuditEventType::OrderPollingError,
                        correlation_id,
                        json!({"proposal_id": proposal_id, "broker_order_id": broker_order_id, "poll_count": poll_count, "error": e.to_string()}),
                    )
                    .await;
                    if poll_count + 1 < max_polls {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        Err(ControlPlaneError::TimeoutError(format!(
            "order polling timed out after {max_polls} attempts"
        )))
    }
}
