use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Per-alert-type rate limit, grounded in
/// `original_source/packages/alerting/__init__.py`'s `AlertConfig.rate_limit_seconds`
/// (default 300s, env var `ALERT_RATE_LIMIT`).
#[derive(Debug, Clone, Copy)]
pub struct AlertRateLimiterConfig {
    pub rate_limit: chrono::Duration,
}

impl Default for AlertRateLimiterConfig {
    fn default() -> Self {
        Self {
            rate_limit: chrono::Duration::seconds(300),
        }
    }
}

/// Tracks the last-sent timestamp per alert type so emitters don't flood the
/// same channel (spec §5's "Alert rate-limit table" resource), grounded in
/// `alerting/__init__.py`'s `_check_rate_limit`. `bypass_rate_limit` on
/// `should_send` mirrors `send_alert(bypass_rate_limit=True)`, which
/// `alert_kill_switch_activated` always sets so a halt is never swallowed by
/// the limiter.
pub struct AlertRateLimiter {
    config: AlertRateLimiterConfig,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertRateLimiter {
    pub fn new(config: AlertRateLimiterConfig) -> Self {
        Self {
            config,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether an alert of `alert_type` may be sent now. A `true`
    /// result records `now` as the new last-sent timestamp for that type, so
    /// this must only be called once per actual send attempt.
    pub fn should_send(&self, alert_type: &str, now: DateTime<Utc>, bypass: bool) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap();
        if !bypass {
            if let Some(last) = last_sent.get(alert_type) {
                if now - *last < self.config.rate_limit {
                    return false;
                }
            }
        }
        last_sent.insert(alert_type.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_alert_within_window_is_rate_limited() {
        let limiter = AlertRateLimiter::new(AlertRateLimiterConfig::default());
        let t0 = Utc::now();
        assert!(limiter.should_send("kill_switch", t0, false));
        assert!(!limiter.should_send("kill_switch", t0 + chrono::Duration::seconds(10), false));
    }

    #[test]
    fn alert_after_window_elapses_sends_again() {
        let limiter = AlertRateLimiter::new(AlertRateLimiterConfig::default());
        let t0 = Utc::now();
        assert!(limiter.should_send("kill_switch", t0, false));
        assert!(limiter.should_send("kill_switch", t0 + chrono::Duration::seconds(301), false));
    }

    #[test]
    fn bypass_ignores_rate_limit() {
        let limiter = AlertRateLimiter::new(AlertRateLimiterConfig::default());
        let t0 = Utc::now();
        assert!(limiter.should_send("kill_switch", t0, true));
        assert!(limiter.should_send("kill_switch", t0 + chrono::Duration::seconds(1), true));
    }

    #[test]
    fn distinct_alert_types_are_tracked_independently() {
        let limiter = AlertRateLimiter::new(AlertRateLimiterConfig::default());
        let t0 = Utc::now();
        assert!(limiter.should_send("kill_switch", t0, false));
        assert!(limiter.should_send("reconciliation_critical", t0, false));
    }
}
