use thiserror::Error;

use crate::domain::proposal::OrderState;

/// Errors surfaced by the approval/submission pipeline (spec §7 taxonomy).
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("proposal {proposal_id} is in state {actual:?}, expected {expected:?}")]
    StateError {
        proposal_id: String,
        actual: OrderState,
        expected: OrderState,
    },

    #[error("token {token_id} is invalid, expired, or hash mismatched")]
    TokenInvalid { token_id: String },

    #[error("token {token_id} was already consumed")]
    TokenAlreadyConsumed { token_id: String },

    #[error("broker connection error: {0}")]
    ConnectionError(String),

    #[error("circuit breaker is open, rejecting connection attempt")]
    CircuitOpen,

    #[error("order submission failed: {0}")]
    SubmitError(String),

    #[error("connection is in read-only mode, order submission blocked")]
    ReadOnlyMode,

    #[error("live trading guardrail violated: {0}")]
    GuardrailViolation(String),

    #[error("operation timed out: {0}")]
    TimeoutError(String),

    #[error("proposal {proposal_id} not found")]
    ProposalNotFound { proposal_id: String },

    #[error("ambiguous instrument resolution for {query}")]
    ResolutionError {
        query: String,
        candidates: Vec<crate::domain::instrument::SearchCandidate>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;
