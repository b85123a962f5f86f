use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    MissingOrder,
    UnknownOrder,
    PositionMismatch,
    MissingPosition,
    UnknownPosition,
    CashMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    pub description: String,
    pub internal_value: Option<String>,
    pub broker_value: Option<String>,
    pub difference: Option<Decimal>,
    pub symbol: Option<String>,
    pub order_id: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Severity bucketing for position-quantity differences (spec §4.6 step 3).
pub fn position_severity(diff: Decimal) -> Severity {
    if diff > Decimal::from(100) {
        Severity::Critical
    } else if diff > Decimal::from(10) {
        Severity::High
    } else if diff > Decimal::from(1) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Severity bucketing for dollar cash differences (spec §4.6 step 4).
pub fn cash_severity(diff: Decimal) -> Severity {
    if diff > Decimal::from(10_000) {
        Severity::Critical
    } else if diff > Decimal::from(1_000) {
        Severity::High
    } else if diff > Decimal::from(100) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub timestamp: DateTime<Utc>,
    pub discrepancies: Vec<Discrepancy>,
    pub internal_orders_count: usize,
    pub broker_orders_count: usize,
    pub internal_positions_count: usize,
    pub broker_positions_count: usize,
    pub internal_cash: Decimal,
    pub broker_cash: Decimal,
    pub duration_ms: f64,
}

impl ReconciliationReport {
    pub fn is_reconciled(&self) -> bool {
        self.discrepancies.is_empty()
    }

    pub fn has_critical(&self) -> bool {
        self.discrepancies
            .iter()
            .any(|d| d.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cash_severity_boundaries_match_spec() {
        assert_eq!(cash_severity(Decimal::new(50, 2)), Severity::Low); // $0.50
        assert_eq!(cash_severity(Decimal::from(500)), Severity::Medium);
        assert_eq!(cash_severity(Decimal::from(5_000)), Severity::High);
        assert_eq!(cash_severity(Decimal::new(1000001, 2)), Severity::Critical); // $10000.01
    }

    #[test]
    fn position_severity_boundaries_match_spec() {
        assert_eq!(position_severity(Decimal::from(1)), Severity::Low);
        assert_eq!(position_severity(Decimal::from(5)), Severity::Medium);
        assert_eq!(position_severity(Decimal::from(50)), Severity::High);
        assert_eq!(position_severity(Decimal::from(200)), Severity::Critical);
    }
}
