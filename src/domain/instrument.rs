use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentType {
    Stk,
    Etf,
    Fut,
    Opt,
    Fx,
    Crypto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentContract {
    pub con_id: i64,
    pub symbol: String,
    pub instrument_type: InstrumentType,
    pub exchange: String,
    pub currency: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub con_id: i64,
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: String,
    pub currency: String,
    pub match_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct InstrumentFilters {
    pub instrument_type: Option<InstrumentType>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub symbol: String,
    pub con_id: Option<i64>,
    pub filters: InstrumentFilters,
}

#[derive(Debug, Clone)]
pub struct ResolveResponse {
    pub contract: InstrumentContract,
    pub ambiguous: bool,
    pub alternatives: Vec<SearchCandidate>,
    pub resolution_method: &'static str,
}
