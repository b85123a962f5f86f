use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of an order intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Order type accepted by the broker interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Mkt,
    Lmt,
}

/// Security type of the underlying instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecType {
    Stk,
    Etf,
    Fut,
    Opt,
    Fx,
    Crypto,
}

/// Canonical order intent payload. Its serialized form is the cryptographic
/// binding material for the approval token (`OrderProposal::intent_hash`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub sec_type: SecType,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

/// Decision returned by the external risk-rule oracle (consumed, not evaluated here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskDecision {
    Approve,
    Reject,
    ManualReview,
}

/// Minimal view of the external simulation oracle's output that the control
/// plane reads (only `gross_notional` participates in auto-approval logic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub gross_notional: Decimal,
    #[serde(default)]
    pub estimated_fill_price: Option<Decimal>,
}
