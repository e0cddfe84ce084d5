use serde::{Deserialize, Serialize};

/// Explicit failure reasons shared by the oracle and the ledger.
///
/// Every rejected request or transaction carries exactly one of these so
/// clients and tests can assert on the precise cause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    PolicyDenied,
    InvalidPayload,
    MalformedPermit,
    SubjectMismatch,
    ActionResourceMismatch,
    NonceMismatch,
    NonceReplay,
    PermitExpired,
    AttestationMismatch,
    SignatureInvalid,
    AlreadyExists,
    NotFound,
    UnauthorizedConfigUpdate,
    /// Ledger trust configuration has not been installed.
    NotInitialized,
    /// Optimistic commit lost a race on a non-nonce key.
    WriteConflict,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::PolicyDenied => "POLICY_DENIED",
            ReasonCode::InvalidPayload => "INVALID_PAYLOAD",
            ReasonCode::MalformedPermit => "MALFORMED_PERMIT",
            ReasonCode::SubjectMismatch => "SUBJECT_MISMATCH",
            ReasonCode::ActionResourceMismatch => "ACTION_RESOURCE_MISMATCH",
            ReasonCode::NonceMismatch => "NONCE_MISMATCH",
            ReasonCode::NonceReplay => "NONCE_REPLAY",
            ReasonCode::PermitExpired => "PERMIT_EXPIRED",
            ReasonCode::AttestationMismatch => "ATTESTATION_MISMATCH",
            ReasonCode::SignatureInvalid => "SIGNATURE_INVALID",
            ReasonCode::AlreadyExists => "ALREADY_EXISTS",
            ReasonCode::NotFound => "NOT_FOUND",
            ReasonCode::UnauthorizedConfigUpdate => "UNAUTHORIZED_CONFIG_UPDATE",
            ReasonCode::NotInitialized => "NOT_INITIALIZED",
            ReasonCode::WriteConflict => "WRITE_CONFLICT",
        }
    }

    /// Whether resubmitting with a fresh nonce and permit could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReasonCode::PermitExpired | ReasonCode::NonceReplay | ReasonCode::WriteConflict
        )
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
