use crate::domain::policy::{AutoApprovalPolicy, PolicyContext};

/// Evaluates an [`AutoApprovalPolicy`] against a single order (spec §4.3).
/// Each rule is independent; `check_all` accumulates every failing reason so
/// the caller can present them together.
pub struct PolicyEvaluator<'a> {
    policy: &'a AutoApprovalPolicy,
}

impl<'a> PolicyEvaluator<'a> {
    pub fn new(policy: &'a AutoApprovalPolicy) -> Self {
        Self { policy }
    }

    pub fn check_all(&self, ctx: &PolicyContext) -> (bool, Vec<String>) {
        if !self.policy.enabled {
            return (false, vec!["Policy disabled".to_string()]);
        }

        let mut reasons = Vec::new();

        if let Err(r) = self.check_symbol(ctx.symbol) {
            reasons.push(r);
        }
        if let Err(r) = self.check_security_type(ctx.sec_type) {
            reasons.push(r);
        }
        if let Err(r) = self.check_time_window(ctx.now_local, ctx.day_of_week) {
            reasons.push(r);
        }
        if let Err(r) = self.check_order_type(ctx.order_type) {
            reasons.push(r);
        }
        if let Err(r) = self.check_dca_schedule(ctx.symbol, ctx.side, ctx.order_type, ctx.notional) {
            reasons.push(r);
        }
        if let Err(r) = self.check_position_size(ctx.notional, ctx.portfolio_nav) {
            reasons.push(r);
        }

        (reasons.is_empty(), reasons)
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), String> {
        if self.policy.symbol_blacklist.iter().any(|s| s == symbol) {
            return Err(format!("Symbol {symbol} is blacklisted"));
        }
        if let Some(whitelist) = &self.policy.symbol_whitelist {
            if !whitelist.iter().any(|s| s == symbol) {
                return Err(format!("Symbol {symbol} not in whitelist"));
            }
        }
        Ok(())
    }

    fn check_security_type(&self, sec_type: &str) -> Result<(), String> {
        if !self.policy.allowed_sec_types.iter().any(|s| s == sec_type) {
            return Err(format!("Security type {sec_type} not allowed"));
        }
        Ok(())
    }

    fn check_time_window(
        &self,
        now_local: chrono::NaiveTime,
        day: crate::domain::policy::DayOfWeek,
    ) -> Result<(), String> {
        if self.policy.time_windows.is_empty() {
            return Ok(());
        }
        if self.policy.time_windows.iter().any(|w| w.contains(now_local, day)) {
            Ok(())
        } else {
            Err("Outside allowed time window".to_string())
        }
    }

    fn check_order_type(&self, order_type: crate::domain::types::OrderType) -> Result<(), String> {
        if !self.policy.allowed_order_types.contains(&order_type) {
            return Err(format!("Order type {order_type:?} not allowed"));
        }
        Ok(())
    }

    fn check_dca_schedule(
        &self,
        symbol: &str,
        side: crate::domain::types::Side,
        order_type: crate::domain::types::OrderType,
        notional: f64,
    ) -> Result<(), String> {
        if self.policy.dca_schedules.is_empty() {
            return Ok(());
        }
        for schedule in &self.policy.dca_schedules {
            if !schedule.symbols.iter().any(|s| s == symbol) {
                continue;
            }
            if schedule.side != side || schedule.order_type != order_type {
                continue;
            }
            if notional > schedule.max_order_size {
                return Err(format!(
                    "DCA order size ${notional} exceeds limit ${}",
                    schedule.max_order_size
                ));
            }
            return Ok(());
        }
        // No matching schedule: not a blocking condition.
        Ok(())
    }

    fn check_position_size(&self, notional: f64, portfolio_nav: Option<f64>) -> Result<(), String> {
        let Some(max_pct) = self.policy.max_position_pct else {
            return Ok(());
        };
        let Some(nav) = portfolio_nav.filter(|n| *n > 0.0) else {
            return Err("Cannot verify position size limit (portfolio NAV unavailable)".to_string());
        };
        let position_pct = notional / nav * 100.0;
        if position_pct > max_pct {
            return Err(format!(
                "Position size {position_pct:.2}% exceeds limit {max_pct}%"
            ));
        }
        Ok(())
    }
}
