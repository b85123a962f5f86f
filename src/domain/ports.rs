use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::instrument::{InstrumentContract, InstrumentFilters, SearchCandidate};
use crate::domain::market_data::{BarsRequest, MarketBar, MarketSnapshot};
use crate::domain::proposal::OrderState;
use crate::domain::token::ApprovalToken;
use crate::domain::types::OrderIntent;

/// Broker-reported order status (spec §6.2 terminal mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerOrderStatus {
    Filled,
    Completed,
    Cancelled,
    Rejected,
    Error,
    Submitted,
    Presubmitted,
    Pending,
}

impl BrokerOrderStatus {
    pub fn to_order_state(self) -> OrderState {
        match self {
            BrokerOrderStatus::Filled | BrokerOrderStatus::Completed => OrderState::Filled,
            BrokerOrderStatus::Cancelled => OrderState::Cancelled,
            BrokerOrderStatus::Rejected | BrokerOrderStatus::Error => OrderState::Rejected,
            BrokerOrderStatus::Submitted | BrokerOrderStatus::Presubmitted => {
                OrderState::Submitted
            }
            BrokerOrderStatus::Pending => OrderState::Submitted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BrokerOrderStatus::Filled
                | BrokerOrderStatus::Completed
                | BrokerOrderStatus::Cancelled
                | BrokerOrderStatus::Rejected
                | BrokerOrderStatus::Error
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub broker_order_id: String,
    pub status: BrokerOrderStatus,
    pub symbol: String,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: Decimal,
    pub positions: std::collections::HashMap<String, Decimal>,
    pub nav: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalOpenOrder {
    pub order_id: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub side: String,
}

/// Abstract broker execution venue (spec §6.2). Implementations own the
/// wire protocol; the control plane consumes only this interface.
#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn is_connected(&self) -> bool;

    async fn get_accounts(&self) -> Result<Vec<BrokerAccount>>;
    async fn get_portfolio(&self, account_id: &str) -> Result<Portfolio>;
    async fn get_open_orders(&self, account_id: &str) -> Result<Vec<InternalOpenOrder>>;

    async fn get_market_snapshot(&self, instrument: &str) -> Result<MarketSnapshot>;
    async fn get_market_bars(&self, request: BarsRequest) -> Result<Vec<MarketBar>>;

    async fn submit_order(
        &self,
        intent: &OrderIntent,
        token: &ApprovalToken,
    ) -> Result<BrokerOrder>;
    async fn get_order_status(&self, broker_order_id: &str) -> Result<BrokerOrder>;

    async fn search_instruments(
        &self,
        query: &str,
        filters: &InstrumentFilters,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>>;
    /// Returns every contract the broker considers an exact match for
    /// `symbol` under `filters`. Callers decide what "exact" means when
    /// more than one comes back — see `InstrumentResolver::resolve` (spec
    /// §4.8), which treats more than one hit as ambiguous rather than
    /// picking arbitrarily.
    async fn resolve_instrument(
        &self,
        symbol: &str,
        filters: &InstrumentFilters,
    ) -> Result<Vec<InstrumentContract>>;
    async fn get_contract_by_id(&self, con_id: i64) -> Result<Option<InstrumentContract>>;

    /// Round-trip probe for the connection manager's health check.
    async fn ping(&self) -> Result<()>;
}

/// Append-only audit sink (spec §6.4 treats persistence as external; this
/// trait is the seam the order submitter and reconciliation engine write
/// through). Failure to append must never roll back a business transaction.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: crate::domain::audit::AuditEvent) -> Result<()>;
}
