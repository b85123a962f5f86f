use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::discrepancy::{
    cash_severity, position_severity, Discrepancy, DiscrepancyKind, ReconciliationReport,
};
use crate::domain::ports::{BrokerPort, InternalOpenOrder, Portfolio};

/// Internal book state the reconciler diffs against the broker (spec §4.6
/// step 1). The control plane's own view, assembled from proposal store /
/// ledger state by the caller.
pub struct InternalBook {
    pub open_orders: Vec<InternalOpenOrder>,
    pub positions: HashMap<String, Decimal>,
    pub cash: Decimal,
}

/// Diffs internal order/position/cash state against the broker's reported
/// state, bucketing each difference by severity (spec §4.6).
pub struct Reconciler {
    broker: Arc<dyn BrokerPort>,
}

impl Reconciler {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self { broker }
    }

    /// Fetches broker orders and portfolio and diffs them against `internal`.
    /// If either broker fetch fails, returns a normal report carrying a
    /// single critical `CASH_MISMATCH` discrepancy describing the fetch
    /// failure rather than propagating the error (spec §4.6 step 1), grounded
    /// in `original_source/packages/reconciliation/__init__.py`'s try/except
    /// around the broker calls.
    pub async fn reconcile(
        &self,
        account_id: &str,
        internal: &InternalBook,
    ) -> anyhow::Result<ReconciliationReport> {
        let started = Instant::now();
        let now = Utc::now();

        let (broker_orders, broker_portfolio) = match self.fetch_broker_state(account_id).await {
            Ok(state) => state,
            Err(e) => {
                return Ok(ReconciliationReport {
                    timestamp: now,
                    discrepancies: vec![Discrepancy {
                        kind: DiscrepancyKind::CashMismatch,
                        severity: crate::domain::discrepancy::Severity::Critical,
                        description: format!("Cannot fetch broker state: {e}"),
                        internal_value: Some(internal.cash.to_string()),
                        broker_value: None,
                        difference: None,
                        symbol: None,
                        order_id: None,
                        detected_at: now,
                    }],
                    internal_orders_count: internal.open_orders.len(),
                    broker_orders_count: 0,
                    internal_positions_count: internal.positions.len(),
                    broker_positions_count: 0,
                    internal_cash: internal.cash,
                    broker_cash: Decimal::ZERO,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                });
            }
        };

        let mut discrepancies = Vec::new();
        discrepancies.extend(diff_orders(&internal.open_orders, &broker_orders, now));
        discrepancies.extend(diff_positions(
            &internal.positions,
            &broker_portfolio.positions,
            now,
        ));
        if let Some(d) = diff_cash(internal.cash, broker_portfolio.cash, now) {
            discrepancies.push(d);
        }

        Ok(ReconciliationReport {
            timestamp: now,
            discrepancies,
            internal_orders_count: internal.open_orders.len(),
            broker_orders_count: broker_orders.len(),
            internal_positions_count: internal.positions.len(),
            broker_positions_count: broker_portfolio.positions.len(),
            internal_cash: internal.cash,
            broker_cash: broker_portfolio.cash,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    async fn fetch_broker_state(
        &self,
        account_id: &str,
    ) -> anyhow::Result<(Vec<InternalOpenOrder>, Portfolio)> {
        let broker_orders = self.broker.get_open_orders(account_id).await?;
        let broker_portfolio = self.broker.get_portfolio(account_id).await?;
        Ok((broker_orders, broker_portfolio))
    }
}

fn diff_orders(
    internal: &[InternalOpenOrder],
    broker: &[crate::domain::ports::InternalOpenOrder],
    now: chrono::DateTime<Utc>,
) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    let internal_ids: std::collections::HashSet<&str> =
        internal.iter().map(|o| o.order_id.as_str()).collect();
    let broker_ids: std::collections::HashSet<&str> =
        broker.iter().map(|o| o.order_id.as_str()).collect();

    for order in internal {
        if !broker_ids.contains(order.order_id.as_str()) {
            out.push(Discrepancy {
                kind: DiscrepancyKind::MissingOrder,
                severity: crate::domain::discrepancy::Severity::High,
                description: format!(
                    "Order {} tracked internally but absent from broker",
                    order.order_id
                ),
                internal_value: Some(order.quantity.to_string()),
                broker_value: None,
                difference: None,
                symbol: Some(order.symbol.clone()),
                order_id: Some(order.order_id.clone()),
                detected_at: now,
            });
        }
    }
    for order in broker {
        if !internal_ids.contains(order.order_id.as_str()) {
            out.push(Discrepancy {
                kind: DiscrepancyKind::UnknownOrder,
                severity: crate::domain::discrepancy::Severity::Critical,
                description: format!(
                    "Order {} reported by broker but unknown internally",
                    order.order_id
                ),
                internal_value: None,
                broker_value: Some(order.quantity.to_string()),
                difference: None,
                symbol: Some(order.symbol.clone()),
                order_id: Some(order.order_id.clone()),
                detected_at: now,
            });
        }
    }
    out
}

fn diff_positions(
    internal: &HashMap<String, Decimal>,
    broker: &HashMap<String, Decimal>,
    now: chrono::DateTime<Utc>,
) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    let mut symbols: std::collections::HashSet<&String> = internal.keys().collect();
    symbols.extend(broker.keys());

    for symbol in symbols {
        let internal_qty = internal.get(symbol).copied();
        let broker_qty = broker.get(symbol).copied();

        match (internal_qty, broker_qty) {
            (Some(i), Some(b)) => {
                let diff = (i - b).abs();
                if diff > Decimal::ZERO {
                    out.push(Discrepancy {
                        kind: DiscrepancyKind::PositionMismatch,
                        severity: position_severity(diff),
                        description: format!(
                            "Position {symbol} differs: internal {i}, broker {b}"
                        ),
                        internal_value: Some(i.to_string()),
                        broker_value: Some(b.to_string()),
                        difference: Some(diff),
                        symbol: Some(symbol.clone()),
                        order_id: None,
                        detected_at: now,
                    });
                }
            }
            (Some(i), None) => out.push(Discrepancy {
                kind: DiscrepancyKind::MissingPosition,
                severity: position_severity(i.abs()),
                description: format!("Position {symbol} tracked internally but absent at broker"),
                internal_value: Some(i.to_string()),
                broker_value: None,
                difference: Some(i.abs()),
                symbol: Some(symbol.clone()),
                order_id: None,
                detected_at: now,
            }),
            (None, Some(b)) => out.push(Discrepancy {
                kind: DiscrepancyKind::UnknownPosition,
                severity: position_severity(b.abs()),
                description: format!("Position {symbol} held at broker but unknown internally"),
                internal_value: None,
                broker_value: Some(b.to_string()),
                difference: Some(b.abs()),
                symbol: Some(symbol.clone()),
                order_id: None,
                detected_at: now,
            }),
            (None, None) => unreachable!("symbol drawn from the union of both key sets"),
        }
    }
    out
}

fn diff_cash(
    internal_cash: Decimal,
    broker_cash: Decimal,
    now: chrono::DateTime<Utc>,
) -> Option<Discrepancy> {
    let diff = (internal_cash - broker_cash).abs();
    if diff <= Decimal::ZERO {
        return None;
    }
    Some(Discrepancy {
        kind: DiscrepancyKind::CashMismatch,
        severity: cash_severity(diff),
        description: format!("Cash differs: internal {internal_cash}, broker {broker_cash}"),
        internal_value: Some(internal_cash.to_string()),
        broker_value: Some(broker_cash.to_string()),
        difference: Some(diff),
        symbol: None,
        order_id: None,
        detected_at: now,
    })
}
