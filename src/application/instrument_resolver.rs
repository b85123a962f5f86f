use std::sync::Arc;

use crate::domain::errors::{ControlPlaneError, ControlPlaneResult};
use crate::domain::instrument::{
    InstrumentContract, InstrumentFilters, ResolveRequest, ResolveResponse, SearchCandidate,
};
use crate::domain::ports::BrokerPort;

/// Resolves a free-text symbol into a concrete broker contract, scoring
/// candidates by string similarity when no exact match exists (spec §4.8),
/// grounded in the original `packages/instrument_resolver` module's fuzzy
/// matching pass.
pub struct InstrumentResolver {
    broker: Arc<dyn BrokerPort>,
}

impl InstrumentResolver {
    pub fn new(broker: Arc<dyn BrokerPort>) -> Self {
        Self { broker }
    }

    pub async fn search(
        &self,
        query: &str,
        filters: &InstrumentFilters,
        limit: usize,
    ) -> anyhow::Result<Vec<SearchCandidate>> {
        let mut candidates = self.broker.search_instruments(query, filters, limit).await?;
        for c in &mut candidates {
            c.match_score = score_candidate(query, &c.symbol, c.name.as_deref());
        }
        candidates.sort_by(|a, b| b.match_score.partial_cmp(&a.match_score).unwrap());
        candidates.truncate(limit);
        Ok(candidates)
    }

    pub async fn resolve(&self, request: &ResolveRequest) -> ControlPlaneResult<ResolveResponse> {
        if let Some(con_id) = request.con_id {
            let contract = self
                .broker
                .get_contract_by_id(con_id)
                .await
                .map_err(ControlPlaneError::Other)?;
            return match contract {
                Some(contract) => Ok(ResolveResponse {
                    contract,
                    ambiguous: false,
                    alternatives: vec![],
                    resolution_method: "con_id",
                }),
                None => Err(ControlPlaneError::ResolutionError {
                    query: request.symbol.clone(),
                    candidates: vec![],
                }),
            };
        }

        if let Ok(mut exact_matches) = self
            .broker
            .resolve_instrument(&request.symbol, &request.filters)
            .await
        {
            match exact_matches.len() {
                0 => {}
                1 => {
                    return Ok(ResolveResponse {
                        contract: exact_matches.remove(0),
                        ambiguous: false,
                        alternatives: vec![],
                        resolution_method: "exact",
                    });
                }
                _ => {
                    let best = exact_matches.remove(0);
                    let alternatives = exact_matches.into_iter().map(contract_to_candidate).collect();
                    return Ok(ResolveResponse {
                        contract: best,
                        ambiguous: true,
                        alternatives,
                        resolution_method: "exact",
                    });
                }
            }
        }

        let candidates = self.search(&request.symbol, &request.filters, 10).await.unwrap_or_default();
        let Some(best) = candidates.first() else {
            return Err(ControlPlaneError::ResolutionError {
                query: request.symbol.clone(),
                candidates: vec![],
            });
        };

        let contract = InstrumentContract {
            con_id: best.con_id,
            symbol: best.symbol.clone(),
            instrument_type: request
                .filters
                .instrument_type
                .unwrap_or(crate::domain::instrument::InstrumentType::Stk),
            exchange: best.exchange.clone(),
            currency: best.currency.clone(),
            name: best.name.clone(),
        };

        let ambiguous = best.match_score < 0.95
            && candidates
                .get(1)
                .map(|second| best.match_score - second.match_score < 0.05)
                .unwrap_or(false);

        Ok(ResolveResponse {
            contract,
            ambiguous,
            alternatives: candidates.into_iter().skip(1).collect(),
            resolution_method: "fuzzy",
        })
    }
}

/// Converts an exact-match contract that lost out to the best candidate
/// into a `SearchCandidate` so it can travel in `ResolveResponse::alternatives`
/// alongside fuzzy-search candidates.
fn contract_to_candidate(contract: InstrumentContract) -> SearchCandidate {
    SearchCandidate {
        con_id: contract.con_id,
        symbol: contract.symbol,
        name: contract.name,
        exchange: contract.exchange,
        currency: contract.currency,
        match_score: 1.0,
    }
}

/// Score a candidate against the query: exact match scores 1.0, a
/// symbol-starts-with match scores 0.9, a name-word-prefix match scores
/// 0.85, otherwise the best of a sequence-similarity ratio on the symbol
/// or 0.8x the ratio on the closest name word (spec §4.8).
fn score_candidate(query: &str, symbol: &str, name: Option<&str>) -> f64 {
    let query_upper = query.to_uppercase();
    let symbol_upper = symbol.to_uppercase();

    if symbol_upper == query_upper {
        return 1.0;
    }
    if symbol_upper.starts_with(&query_upper) {
        return 0.9;
    }
    if let Some(name) = name {
        for word in name.to_uppercase().split_whitespace() {
            if word.starts_with(&query_upper) {
                return 0.85;
            }
        }
    }

    let symbol_ratio = sequence_ratio(&query_upper, &symbol_upper);
    let name_ratio = name
        .map(|n| {
            n.to_uppercase()
                .split_whitespace()
                .map(|w| sequence_ratio(&query_upper, w))
                .fold(0.0_f64, f64::max)
        })
        .unwrap_or(0.0);

    symbol_ratio.max(0.8 * name_ratio)
}

/// Gestalt pattern-matching ratio: 2M / T where M is the count of matched
/// characters found by a greedy longest-common-substring recursion and T
/// is the combined length of both strings. Mirrors Python's
/// `difflib.SequenceMatcher.ratio`.
fn sequence_ratio(a: &str, b: &str) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(a.as_bytes(), b.as_bytes());
    (2 * matches) as f64 / total as f64
}

fn matching_chars(a: &[u8], b: &[u8]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (mut best_len, mut best_i, mut best_j) = (0usize, 0usize, 0usize);
    for i in 0..a.len() {
        for j in 0..b.len() {
            let mut len = 0;
            while i + len < a.len() && j + len < b.len() && a[i + len] == b[j + len] {
                len += 1;
            }
            if len > best_len {
                best_len = len;
                best_i = i;
                best_j = j;
            }
        }
    }
    if best_len == 0 {
        return 0;
    }
    best_len
        + matching_chars(&a[..best_i], &b[..best_j])
        + matching_chars(&a[best_i + best_len..], &b[best_j + best_len..])
}
