use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::{OrderType, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn from_chrono(d: chrono::Weekday) -> Self {
        match d {
            chrono::Weekday::Mon => DayOfWeek::Monday,
            chrono::Weekday::Tue => DayOfWeek::Tuesday,
            chrono::Weekday::Wed => DayOfWeek::Wednesday,
            chrono::Weekday::Thu => DayOfWeek::Thursday,
            chrono::Weekday::Fri => DayOfWeek::Friday,
            chrono::Weekday::Sat => DayOfWeek::Saturday,
            chrono::Weekday::Sun => DayOfWeek::Sunday,
        }
    }
}

/// A recurring trading window, e.g. weekday market hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub days: Vec<DayOfWeek>,
}

impl TimeWindow {
    pub fn contains(&self, now: NaiveTime, day: DayOfWeek) -> bool {
        self.days.contains(&day) && self.start_time <= now && now <= self.end_time
    }
}

/// Dollar-cost-averaging allowance for a recurring (symbol, side, order type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaSchedule {
    pub symbols: Vec<String>,
    pub max_order_size: f64,
    pub side: Side,
    pub order_type: OrderType,
}

/// Auto-approval policy descriptor (spec §4.3). Pure data; evaluated by
/// `application::policy_evaluator::PolicyEvaluator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoApprovalPolicy {
    pub enabled: bool,
    pub symbol_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub symbol_blacklist: Vec<String>,
    pub allowed_sec_types: Vec<String>,
    #[serde(default)]
    pub time_windows: Vec<TimeWindow>,
    pub allowed_order_types: Vec<OrderType>,
    #[serde(default)]
    pub dca_schedules: Vec<DcaSchedule>,
    pub max_position_pct: Option<f64>,
}

impl Default for AutoApprovalPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            symbol_whitelist: None,
            symbol_blacklist: Vec::new(),
            allowed_sec_types: vec!["STK".into(), "ETF".into()],
            time_windows: Vec::new(),
            allowed_order_types: vec![OrderType::Mkt, OrderType::Lmt],
            dca_schedules: Vec::new(),
            max_position_pct: None,
        }
    }
}

/// Inputs to a single policy evaluation (spec §4.3).
pub struct PolicyContext<'a> {
    pub symbol: &'a str,
    pub sec_type: &'a str,
    pub side: Side,
    pub order_type: OrderType,
    pub notional: f64,
    pub now_local: NaiveTime,
    pub day_of_week: DayOfWeek,
    pub portfolio_nav: Option<f64>,
}
