use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single-use token binding a proposal to a specific intent payload.
///
/// Validity predicate (spec §3): `used_at.is_none() && now < expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub token_id: String,
    pub proposal_id: String,
    pub intent_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl ApprovalToken {
    pub fn mint(
        token_id: String,
        proposal_id: String,
        intent_hash: String,
        issued_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            token_id,
            proposal_id,
            intent_hash,
            issued_at,
            expires_at: issued_at + ttl,
            used_at: None,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_valid_only_before_expiry_and_unused() {
        let now = Utc::now();
        let t = ApprovalToken::mint(
            "t1".into(),
            "p1".into(),
            "h1".into(),
            now,
            chrono::Duration::minutes(5),
        );
        assert!(t.is_valid(now));
        assert!(!t.is_valid(now + chrono::Duration::minutes(6)));

        let mut used = t.clone();
        used.used_at = Some(now);
        assert!(!used.is_valid(now));
    }
}
