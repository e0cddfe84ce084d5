use custody_types::ReasonCode;
use thiserror::Error;

use crate::keys;
use crate::state::StateError;
use crate::verifier::VerificationError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger errors. Any of these aborts the transaction with no effect.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger trust configuration is not initialized")]
    NotInitialized,

    #[error("unauthorized config update: {approvals} of {threshold} required endorsements")]
    UnauthorizedConfigUpdate { approvals: usize, threshold: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("nonce already consumed by a concurrent transaction")]
    NonceReplay,

    #[error("write conflict on key {0}")]
    WriteConflict(String),

    #[error("state error: {0}")]
    State(StateError),

    #[error("codec error: {0}")]
    Codec(String),
}

impl LedgerError {
    pub fn code(&self) -> Option<ReasonCode> {
        match self {
            LedgerError::Verification(err) => Some(err.code()),
            LedgerError::AlreadyExists(_) => Some(ReasonCode::AlreadyExists),
            LedgerError::NotFound(_) => Some(ReasonCode::NotFound),
            LedgerError::NotInitialized => Some(ReasonCode::NotInitialized),
            LedgerError::UnauthorizedConfigUpdate { .. } => {
                Some(ReasonCode::UnauthorizedConfigUpdate)
            }
            LedgerError::InvalidArgument(_) => Some(ReasonCode::InvalidPayload),
            LedgerError::NonceReplay => Some(ReasonCode::NonceReplay),
            LedgerError::WriteConflict(_) => Some(ReasonCode::WriteConflict),
            LedgerError::State(_) | LedgerError::Codec(_) => None,
        }
    }
}

impl From<StateError> for LedgerError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Conflict { key } if keys::is_nonce(&key) => LedgerError::NonceReplay,
            StateError::Conflict { key } => LedgerError::WriteConflict(key),
            other => LedgerError::State(other),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Codec(err.to_string())
    }
}
