use std::sync::Arc;

use crate::application::feature_flags::FeatureFlagValues;
use crate::application::kill_switch::KillSwitch;
use crate::application::proposal_store::ProposalStore;
use crate::domain::ports::BrokerPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    Pass,
    Fail,
    Warning,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Blocker,
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub result: CheckResult,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct SafetyReport {
    pub checks: Vec<CheckOutcome>,
}

impl SafetyReport {
    /// Live trading is only cleared when nothing failed at BLOCKER or
    /// CRITICAL severity (spec §4.7).
    pub fn ready_for_live(&self) -> bool {
        !self.checks.iter().any(|c| {
            c.result == CheckResult::Fail
                && matches!(c.severity, Severity::Blocker | Severity::Critical)
        })
    }
}

/// Composes independent readiness checks into one go/no-go verdict before
/// live trading is permitted (spec §4.7), grounded in the original
/// `packages/safety_checks` module's check list.
pub struct SafetyGate {
    store: Arc<ProposalStore>,
    kill_switch: Arc<KillSwitch>,
    broker: Arc<dyn BrokerPort>,
}

impl SafetyGate {
    pub fn new(
        store: Arc<ProposalStore>,
        kill_switch: Arc<KillSwitch>,
        broker: Arc<dyn BrokerPort>,
    ) -> Self {
        Self {
            store,
            kill_switch,
            broker,
        }
    }

    pub async fn run(&self, flags: &FeatureFlagValues) -> SafetyReport {
        let mut checks = Vec::with_capacity(7);
        checks.push(self.check_kill_switch());
        checks.push(self.check_broker_connection().await);
        checks.push(self.check_feature_flags(flags));
        checks.push(self.check_pending_proposals());
        checks.push(self.check_live_trading_mode(flags));
        checks.push(self.check_strict_validation(flags));
        checks.push(self.check_broker_ping().await);

        SafetyReport { checks }
    }

    fn check_kill_switch(&self) -> CheckOutcome {
        if self.kill_switch.is_active() {
            CheckOutcome {
                name: "kill_switch",
                result: CheckResult::Fail,
                severity: Severity::Blocker,
                detail: self
                    .kill_switch
                    .reason()
                    .unwrap_or_else(|| "kill switch active".to_string()),
            }
        } else {
            CheckOutcome {
                name: "kill_switch",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "kill switch inactive".to_string(),
            }
        }
    }

    async fn check_broker_connection(&self) -> CheckOutcome {
        if self.broker.is_connected().await {
            CheckOutcome {
                name: "broker_connection",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "broker connected".to_string(),
            }
        } else {
            CheckOutcome {
                name: "broker_connection",
                result: CheckResult::Fail,
                severity: Severity::Blocker,
                detail: "broker not connected".to_string(),
            }
        }
    }

    fn check_feature_flags(&self, flags: &FeatureFlagValues) -> CheckOutcome {
        if flags.strict_validation {
            CheckOutcome {
                name: "feature_flags",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "strict validation enabled".to_string(),
            }
        } else {
            CheckOutcome {
                name: "feature_flags",
                result: CheckResult::Warning,
                severity: Severity::Warning,
                detail: "strict validation disabled".to_string(),
            }
        }
    }

    fn check_pending_proposals(&self) -> CheckOutcome {
        let pending = self.store.list_pending(usize::MAX);
        if pending.is_empty() {
            CheckOutcome {
                name: "pending_proposals",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "no stuck proposals awaiting approval".to_string(),
            }
        } else {
            CheckOutcome {
                name: "pending_proposals",
                result: CheckResult::Warning,
                severity: Severity::Warning,
                detail: format!("{} proposal(s) awaiting approval", pending.len()),
            }
        }
    }

    fn check_live_trading_mode(&self, flags: &FeatureFlagValues) -> CheckOutcome {
        if flags.live_trading_mode {
            CheckOutcome {
                name: "live_trading_mode",
                result: CheckResult::Warning,
                severity: Severity::Warning,
                detail: "live trading mode is enabled".to_string(),
            }
        } else {
            CheckOutcome {
                name: "live_trading_mode",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "paper/simulation mode".to_string(),
            }
        }
    }

    fn check_strict_validation(&self, flags: &FeatureFlagValues) -> CheckOutcome {
        if flags.live_trading_mode && !flags.strict_validation {
            CheckOutcome {
                name: "live_guardrails",
                result: CheckResult::Fail,
                severity: Severity::Critical,
                detail: "live trading mode requires strict validation".to_string(),
            }
        } else {
            CheckOutcome {
                name: "live_guardrails",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "guardrails satisfied".to_string(),
            }
        }
    }

    async fn check_broker_ping(&self) -> CheckOutcome {
        match self.broker.ping().await {
            Ok(()) => CheckOutcome {
                name: "broker_ping",
                result: CheckResult::Pass,
                severity: Severity::Info,
                detail: "ping round-trip succeeded".to_string(),
            },
            Err(e) => CheckOutcome {
                name: "broker_ping",
                result: CheckResult::Fail,
                severity: Severity::Critical,
                detail: format!("ping failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{InstrumentContract, InstrumentFilters, SearchCandidate};
    use crate::domain::market_data::{BarsRequest, MarketBar, MarketSnapshot};
    use crate::domain::ports::{BrokerAccount, BrokerOrder, InternalOpenOrder, Portfolio};
    use crate::domain::token::ApprovalToken;
    use crate::domain::types::OrderIntent;
    use async_trait::async_trait;

    struct FakeBroker {
        connected: bool,
    }

    #[async_trait]
    impl BrokerPort for FakeBroker {
        async fn connect(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            self.connected
        }
        async fn get_accounts(&self) -> anyhow::Result<Vec<BrokerAccount>> {
            Ok(vec![])
        }
        async fn get_portfolio(&self, _account_id: &str) -> anyhow::Result<Portfolio> {
            unimplemented!()
        }
        async fn get_open_orders(&self, _account_id: &str) -> anyhow::Result<Vec<InternalOpenOrder>> {
            Ok(vec![])
        }
        async fn get_market_snapshot(&self, _instrument: &str) -> anyhow::Result<MarketSnapshot> {
            unimplemented!()
        }
        async fn get_market_bars(&self, _request: BarsRequest) -> anyhow::Result<Vec<MarketBar>> {
            unimplemented!()
        }
        async fn submit_order(
            &self,
            _intent: &OrderIntent,
            _token: &ApprovalToken,
        ) -> anyhow::Result<BrokerOrder> {
            unimplemented!()
        }
        async fn get_order_status(&self, _broker_order_id: &str) -> anyhow::Result<BrokerOrder> {
            unimplemented!()
        }
        async fn search_instruments(
            &self,
            _query: &str,
            _filters: &InstrumentFilters,
            _limit: usize,
        ) -> anyhow::Result<Vec<SearchCandidate>> {
            unimplemented!()
        }
        async fn resolve_instrument(
            &self,
            _symbol: &str,
            _filters: &InstrumentFilters,
        ) -> anyhow::Result<Vec<InstrumentContract>> {
            unimplemented!()
        }
        async fn get_contract_by_id(&self, _con_id: i64) -> anyhow::Result<Option<InstrumentContract>> {
            unimplemented!()
        }
        async fn ping(&self) -> anyhow::Result<()> {
            if self.connected {
                Ok(())
            } else {
                Err(anyhow::anyhow!("not connected"))
            }
        }
    }

    #[tokio::test]
    async fn kill_switch_active_blocks_live_readiness() {
        let store = Arc::new(ProposalStore::new(10, chrono::Duration::minutes(5)));
        let kill_switch = Arc::new(KillSwitch::new(
            chrono::Utc::now(),
            Arc::new(crate::application::alert_rate_limiter::AlertRateLimiter::new(
                crate::application::alert_rate_limiter::AlertRateLimiterConfig::default(),
            )),
        ));
        kill_switch.activate("manual halt", chrono::Utc::now());
        let broker = Arc::new(FakeBroker { connected: true });

        let gate = SafetyGate::new(store, kill_switch, broker);
        let report = gate.run(&FeatureFlagValues::default()).await;

        assert!(!report.ready_for_live());
    }

    #[tokio::test]
    async fn disconnected_broker_blocks_live_readiness() {
        let store = Arc::new(ProposalStore::new(10, chrono::Duration::minutes(5)));
        let kill_switch = Arc::new(KillSwitch::new(
            chrono::Utc::now(),
            Arc::new(crate::application::alert_rate_limiter::AlertRateLimiter::new(
                crate::application::alert_rate_limiter::AlertRateLimiterConfig::default(),
            )),
        ));
        let broker = Arc::new(FakeBroker { connected: false });

        let gate = SafetyGate::new(store, kill_switch, broker);
        let report = gate.run(&FeatureFlagValues::default()).await;

        assert!(!report.ready_for_live());
    }

    #[tokio::test]
    async fn healthy_system_clears_the_gate() {
        let store = Arc::new(ProposalStore::new(10, chrono::Duration::minutes(5)));
        let kill_switch = Arc::new(KillSwitch::new(
            chrono::Utc::now(),
            Arc::new(crate::application::alert_rate_limiter::AlertRateLimiter::new(
                crate::application::alert_rate_limiter::AlertRateLimiterConfig::default(),
            )),
        ));
        let broker = Arc::new(FakeBroker { connected: true });

        let gate = SafetyGate::new(store, kill_switch, broker);
        let report = gate.run(&FeatureFlagValues::default()).await;

        assert!(report.ready_for_live());
    }
}
