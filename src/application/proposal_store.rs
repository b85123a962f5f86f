use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::errors::ControlPlaneError;
use crate::domain::proposal::{OrderProposal, OrderState};
use crate::domain::token::ApprovalToken;

struct Inner {
    proposals: HashMap<String, OrderProposal>,
    tokens: HashMap<String, ApprovalToken>,
}

/// Bounded in-memory registry of proposals and their tokens (spec §4.1).
///
/// All operations take one exclusive lock and never perform I/O inside the
/// critical section — broker calls and audit emission happen outside this
/// type entirely.
pub struct ProposalStore {
    inner: Mutex<Inner>,
    max_proposals: usize,
    pub token_ttl: chrono::Duration,
}

impl ProposalStore {
    pub fn new(max_proposals: usize, token_ttl: chrono::Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                proposals: HashMap::new(),
                tokens: HashMap::new(),
            }),
            max_proposals,
            token_ttl,
        }
    }

    /// Insert a proposal, evicting exactly one existing entry first if the
    /// store is at capacity (terminal-first LRU, spec §3/§4.1).
    pub fn store(&self, proposal: OrderProposal) {
        let mut guard = self.inner.lock().unwrap();
        if guard.proposals.len() >= self.max_proposals
            && !guard.proposals.contains_key(&proposal.proposal_id)
        {
            Self::evict_one(&mut guard);
        }
        guard.proposals.insert(proposal.proposal_id.clone(), proposal);
    }

    fn evict_one(guard: &mut Inner) {
        let terminal_oldest = guard
            .proposals
            .values()
            .filter(|p| p.state.is_terminal())
            .min_by_key(|p| p.updated_at)
            .map(|p| p.proposal_id.clone());

        let victim = terminal_oldest.or_else(|| {
            guard
                .proposals
                .values()
                .min_by_key(|p| p.created_at)
                .map(|p| p.proposal_id.clone())
        });

        if let Some(id) = victim {
            guard.proposals.remove(&id);
        }
    }

    pub fn get(&self, proposal_id: &str) -> Option<OrderProposal> {
        self.inner.lock().unwrap().proposals.get(proposal_id).cloned()
    }

    pub fn get_token(&self, token_id: &str) -> Option<ApprovalToken> {
        self.inner.lock().unwrap().tokens.get(token_id).cloned()
    }

    pub fn update(&self, proposal: OrderProposal) -> Result<(), ControlPlaneError> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.proposals.contains_key(&proposal.proposal_id) {
            return Err(ControlPlaneError::ProposalNotFound {
                proposal_id: proposal.proposal_id,
            });
        }
        guard.proposals.insert(proposal.proposal_id.clone(), proposal);
        Ok(())
    }

    pub fn insert_token(&self, token: ApprovalToken) {
        let mut guard = self.inner.lock().unwrap();
        guard.tokens.insert(token.token_id.clone(), token);
    }

    /// Proposals awaiting approval, most recently created first.
    pub fn list_pending(&self, limit: usize) -> Vec<OrderProposal> {
        let guard = self.inner.lock().unwrap();
        let mut pending: Vec<OrderProposal> = guard
            .proposals
            .values()
            .filter(|p| matches!(p.state, OrderState::ApprovalRequested | OrderState::RiskApproved))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending.truncate(limit);
        pending
    }

    pub fn validate_token(&self, token_id: &str, expected_intent_hash: &str, now: DateTime<Utc>) -> bool {
        let guard = self.inner.lock().unwrap();
        match guard.tokens.get(token_id) {
            Some(t) => t.is_valid(now) && t.intent_hash == expected_intent_hash,
            None => false,
        }
    }

    /// Atomic test-and-set: the linearization point for order submission
    /// (spec §5 ordering guarantee 2). Exactly one concurrent caller sees
    /// this succeed for a given token.
    pub fn consume_token(
        &self,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalToken, ControlPlaneError> {
        let mut guard = self.inner.lock().unwrap();
        let token = guard
            .tokens
            .get(token_id)
            .cloned()
            .ok_or_else(|| ControlPlaneError::TokenInvalid {
                token_id: token_id.to_string(),
            })?;

        if token.used_at.is_some() {
            return Err(ControlPlaneError::TokenAlreadyConsumed {
                token_id: token_id.to_string(),
            });
        }
        if now >= token.expires_at {
            return Err(ControlPlaneError::TokenInvalid {
                token_id: token_id.to_string(),
            });
        }

        let mut consumed = token;
        consumed.used_at = Some(now);
        guard.tokens.insert(token_id.to_string(), consumed.clone());
        Ok(consumed)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(id: &str, state: OrderState, created_at: DateTime<Utc>) -> OrderProposal {
        let mut p = OrderProposal::new(
            id.into(),
            format!("corr-{id}"),
            r#"{"symbol":"AAPL"}"#.into(),
            state,
            created_at,
        );
        p.updated_at = created_at;
        p
    }

    #[test]
    fn eviction_prefers_terminal_by_updated_at() {
        let store = ProposalStore::new(2, chrono::Duration::minutes(5));
        let t0 = Utc::now();
        store.store(proposal("a", OrderState::Proposed, t0));
        store.store(proposal("b", OrderState::Filled, t0 + chrono::Duration::seconds(1)));

        // At capacity; "b" is terminal so it's evicted even though "a" is older.
        store.store(proposal("c", OrderState::Proposed, t0 + chrono::Duration::seconds(2)));

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn eviction_falls_back_to_oldest_overall_when_no_terminal() {
        let store = ProposalStore::new(2, chrono::Duration::minutes(5));
        let t0 = Utc::now();
        store.store(proposal("a", OrderState::Proposed, t0));
        store.store(proposal("b", OrderState::RiskApproved, t0 + chrono::Duration::seconds(1)));
        store.store(proposal("c", OrderState::Proposed, t0 + chrono::Duration::seconds(2)));

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn consume_token_is_single_use() {
        let store = ProposalStore::new(10, chrono::Duration::minutes(5));
        let now = Utc::now();
        let token = ApprovalToken::mint("t1".into(), "p1".into(), "h1".into(), now, chrono::Duration::minutes(5));
        store.insert_token(token);

        assert!(store.consume_token("t1", now).is_ok());
        assert!(matches!(
            store.consume_token("t1", now),
            Err(ControlPlaneError::TokenAlreadyConsumed { .. })
        ));
    }

    #[test]
    fn update_fails_for_missing_proposal() {
        let store = ProposalStore::new(10, chrono::Duration::minutes(5));
        let p = proposal("missing", OrderState::Proposed, Utc::now());
        assert!(store.update(p).is_err());
    }
}
