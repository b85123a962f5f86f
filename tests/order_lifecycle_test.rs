//! End-to-end exercise of the proposal lifecycle across the approval
//! service, proposal store, and order submitter.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use trade_control_plane::application::approval_service::ApprovalService;
use trade_control_plane::application::feature_flags::FeatureFlagValues;
use trade_control_plane::application::order_submitter::OrderSubmitter;
use trade_control_plane::application::proposal_store::ProposalStore;
use trade_control_plane::config::LiveGuardrails;
use trade_control_plane::domain::ports::BrokerPort;
use trade_control_plane::domain::proposal::{OrderProposal, OrderState};
use trade_control_plane::domain::types::{OrderIntent, OrderType, SecType, Side, SimulationResult};
use trade_control_plane::infrastructure::audit_store::InMemoryAuditSink;
use trade_control_plane::infrastructure::fake_broker::FakeBroker;

fn risk_approved_proposal(symbol: &str, quantity: rust_decimal::Decimal, notional: rust_decimal::Decimal) -> OrderProposal {
    let now = Utc::now();
    let intent = OrderIntent {
        symbol: symbol.to_string(),
        sec_type: SecType::Stk,
        side: Side::Buy,
        order_type: OrderType::Mkt,
        quantity,
        limit_price: None,
    };
    let mut proposal = OrderProposal::new(
        Uuid::new_v4().to_string(),
        Uuid::new_v4().to_string(),
        serde_json::to_string(&intent).unwrap(),
        OrderState::RiskApproved,
        now,
    );
    proposal.simulation_json = Some(
        serde_json::to_string(&SimulationResult {
            gross_notional: notional,
            estimated_fill_price: None,
        })
        .unwrap(),
    );
    proposal
}

#[tokio::test]
async fn auto_approved_order_reaches_filled() {
    let store = Arc::new(ProposalStore::new(100, chrono::Duration::minutes(5)));
    let approval = Arc::new(ApprovalService::new(store.clone()));
    let broker = Arc::new(FakeBroker::new(dec!(100_000)));
    broker.connect().await.unwrap();
    let audit = Arc::new(InMemoryAuditSink::new(100));
    let submitter = OrderSubmitter::new(
        store.clone(),
        approval.clone(),
        broker.clone(),
        audit.clone(),
        false,
        LiveGuardrails::default(),
    );

    let proposal = risk_approved_proposal("AAPL", dec!(10), dec!(1_000));
    store.store(proposal.clone());

    let flags = FeatureFlagValues {
        auto_approval: true,
        auto_approval_max_notional: 5_000.0,
        ..Default::default()
    };
    let (updated, token) = approval
        .request_approval(&proposal.proposal_id, &flags, false, None, Utc::now())
        .unwrap();
    assert_eq!(updated.state, OrderState::ApprovalGranted);
    let token = token.expect("auto-approval should mint a token");

    let broker_order = submitter
        .submit_order(&proposal.proposal_id, &token.token_id, "corr-e2e", &flags)
        .await
        .unwrap();

    let final_proposal = store.get(&proposal.proposal_id).unwrap();
    assert_eq!(final_proposal.state, OrderState::Submitted);
    assert_eq!(final_proposal.broker_order_id.as_deref(), Some(broker_order.broker_order_id.as_str()));

    // The consumed token cannot be replayed against a second submit attempt.
    let replay = approval.consume_token(&token.token_id, Utc::now());
    assert!(replay.is_err());
}

#[tokio::test]
async fn manual_review_order_requires_grant_before_submission() {
    let store = Arc::new(ProposalStore::new(100, chrono::Duration::minutes(5)));
    let approval = Arc::new(ApprovalService::new(store.clone()));
    let broker = Arc::new(FakeBroker::new(dec!(100_000)));
    broker.connect().await.unwrap();
    let audit = Arc::new(InMemoryAuditSink::new(100));
    let submitter = OrderSubmitter::new(
        store.clone(),
        approval.clone(),
        broker.clone(),
        audit.clone(),
        false,
        LiveGuardrails::default(),
    );

    let proposal = risk_approved_proposal("SPY", dec!(5), dec!(50_000));
    store.store(proposal.clone());

    let (updated, token) = approval
        .request_approval(&proposal.proposal_id, &FeatureFlagValues::default(), false, None, Utc::now())
        .unwrap();
    assert_eq!(updated.state, OrderState::ApprovalRequested);
    assert!(token.is_none());

    let result = submitter
        .submit_order(&proposal.proposal_id, "nonexistent-token", "corr-manual", &FeatureFlagValues::default())
        .await;
    assert!(result.is_err());

    let (_, granted_token) = approval.grant_approval(&proposal.proposal_id, Some("ops approved".into()), Utc::now()).unwrap();
    let order = submitter
        .submit_order(&proposal.proposal_id, &granted_token.token_id, "corr-manual", &FeatureFlagValues::default())
        .await
        .unwrap();
    assert_eq!(order.quantity, dec!(5));
}
