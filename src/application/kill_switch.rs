use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::application::alert_rate_limiter::AlertRateLimiter;

struct State {
    active: bool,
    reason: Option<String>,
    changed_at: DateTime<Utc>,
}

/// Process-wide trading halt (spec §4.11). Reads are cheap; writes record a
/// reason so operators can see why trading stopped.
pub struct KillSwitch {
    state: Mutex<State>,
    alert_rate_limiter: Arc<AlertRateLimiter>,
}

impl KillSwitch {
    pub fn new(now: DateTime<Utc>, alert_rate_limiter: Arc<AlertRateLimiter>) -> Self {
        Self {
            state: Mutex::new(State {
                active: false,
                reason: None,
                changed_at: now,
            }),
            alert_rate_limiter,
        }
    }

    /// Activates the halt and signals the alert rate limiter to bypass its
    /// window for this alert type (spec §7), grounded in
    /// `original_source/packages/alerting/__init__.py`'s
    /// `alert_kill_switch_activated`, which always passes
    /// `bypass_rate_limit=True` so a halt is never swallowed by the limiter.
    pub fn activate(&self, reason: impl Into<String>, now: DateTime<Utc>) {
        let reason = reason.into();
        let mut guard = self.state.lock().unwrap();
        guard.active = true;
        guard.reason = Some(reason);
        guard.changed_at = now;
        drop(guard);
        self.alert_rate_limiter.should_send("kill_switch_activated", now, true);
    }

    pub fn deactivate(&self, now: DateTime<Utc>) {
        let mut guard = self.state.lock().unwrap();
        guard.active = false;
        guard.reason = None;
        guard.changed_at = now;
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    pub fn reason(&self) -> Option<String> {
        self.state.lock().unwrap().reason.clone()
    }
}
