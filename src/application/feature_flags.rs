use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Runtime feature toggles, layered defaults < file < environment (spec §6.3,
/// §4.12), grounded in the original `packages/feature_flags` module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureFlagValues {
    pub live_trading_mode: bool,
    pub auto_approval: bool,
    pub auto_approval_max_notional: f64,
    pub new_risk_rules: bool,
    pub strict_validation: bool,
    pub enable_dashboard: bool,
}

impl Default for FeatureFlagValues {
    fn default() -> Self {
        Self {
            live_trading_mode: false,
            auto_approval: false,
            auto_approval_max_notional: 1000.0,
            new_risk_rules: false,
            strict_validation: true,
            enable_dashboard: true,
        }
    }
}

impl FeatureFlagValues {
    fn merge_file(mut self, path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return self;
        };
        let Ok(file_values) = serde_json::from_str::<serde_json::Value>(&contents) else {
            return self;
        };
        apply_overrides(&mut self, &file_values);
        self
    }

    fn merge_env(mut self) -> Self {
        if let Ok(v) = std::env::var("LIVE_TRADING_MODE") {
            self.live_trading_mode = parse_bool(&v, self.live_trading_mode);
        }
        if let Ok(v) = std::env::var("AUTO_APPROVAL") {
            self.auto_approval = parse_bool(&v, self.auto_approval);
        }
        if let Ok(v) = std::env::var("AUTO_APPROVAL_MAX_NOTIONAL") {
            if let Ok(n) = v.parse() {
                self.auto_approval_max_notional = n;
            }
        }
        if let Ok(v) = std::env::var("NEW_RISK_RULES") {
            self.new_risk_rules = parse_bool(&v, self.new_risk_rules);
        }
        if let Ok(v) = std::env::var("STRICT_VALIDATION") {
            self.strict_validation = parse_bool(&v, self.strict_validation);
        }
        if let Ok(v) = std::env::var("ENABLE_DASHBOARD") {
            self.enable_dashboard = parse_bool(&v, self.enable_dashboard);
        }
        self
    }
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}

fn apply_overrides(target: &mut FeatureFlagValues, file_values: &serde_json::Value) {
    if let Some(b) = file_values.get("live_trading_mode").and_then(|v| v.as_bool()) {
        target.live_trading_mode = b;
    }
    if let Some(b) = file_values.get("auto_approval").and_then(|v| v.as_bool()) {
        target.auto_approval = b;
    }
    if let Some(n) = file_values
        .get("auto_approval_max_notional")
        .and_then(|v| v.as_f64())
    {
        target.auto_approval_max_notional = n;
    }
    if let Some(b) = file_values.get("new_risk_rules").and_then(|v| v.as_bool()) {
        target.new_risk_rules = b;
    }
    if let Some(b) = file_values.get("strict_validation").and_then(|v| v.as_bool()) {
        target.strict_validation = b;
    }
    if let Some(b) = file_values.get("enable_dashboard").and_then(|v| v.as_bool()) {
        target.enable_dashboard = b;
    }
}

/// Thread-safe holder for the active flag set, with a `reload` that re-runs
/// the file+env layering.
pub struct FeatureFlags {
    values: RwLock<FeatureFlagValues>,
    config_path: Option<std::path::PathBuf>,
}

impl FeatureFlags {
    pub fn load(config_path: Option<std::path::PathBuf>) -> Self {
        let values = Self::layer(config_path.as_deref());
        Self {
            values: RwLock::new(values),
            config_path,
        }
    }

    fn layer(config_path: Option<&Path>) -> FeatureFlagValues {
        let defaults = FeatureFlagValues::default();
        let with_file = match config_path {
            Some(p) => defaults.merge_file(p),
            None => defaults,
        };
        with_file.merge_env()
    }

    pub fn reload(&self) {
        let fresh = Self::layer(self.config_path.as_deref());
        *self.values.write().unwrap() = fresh;
    }

    pub fn snapshot(&self) -> FeatureFlagValues {
        self.values.read().unwrap().clone()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        let v = self.snapshot();
        match name {
            "live_trading_mode" => v.live_trading_mode,
            "auto_approval" => v.auto_approval,
            "new_risk_rules" => v.new_risk_rules,
            "strict_validation" => v.strict_validation,
            "enable_dashboard" => v.enable_dashboard,
            _ => false,
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_auto_approval_off() {
        let flags = FeatureFlags::default();
        assert!(!flags.snapshot().auto_approval);
        assert_eq!(flags.snapshot().auto_approval_max_notional, 1000.0);
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("ff-test-{}", uuid::Uuid::new_v4()));
        std::fs::write(&dir, r#"{"auto_approval": true, "auto_approval_max_notional": 2500.0}"#).unwrap();
        let flags = FeatureFlags::load(Some(dir.clone()));
        assert!(flags.snapshot().auto_approval);
        assert_eq!(flags.snapshot().auto_approval_max_notional, 2500.0);
        std::fs::remove_file(&dir).ok();
    }
}
