use custody_attestation::AttestationError;
use custody_crypto::CryptoError;
use custody_permit::PermitError;
use custody_policy::PolicyError;
use custody_types::ReasonCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("invalid oracle configuration: {0}")]
    InvalidConfig(String),

    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error(transparent)]
    Permit(#[from] PermitError),

    #[error(transparent)]
    Attestation(#[from] AttestationError),
}

impl OracleError {
    pub fn code(&self) -> Option<ReasonCode> {
        match self {
            OracleError::PolicyDenied(_) => Some(ReasonCode::PolicyDenied),
            OracleError::InvalidRequest(_) => Some(ReasonCode::InvalidPayload),
            OracleError::Permit(err) => err.code(),
            OracleError::Attestation(err) => err.code(),
            OracleError::InvalidConfig(_) | OracleError::KeyUnavailable(_) => None,
        }
    }
}

impl From<PolicyError> for OracleError {
    fn from(err: PolicyError) -> Self {
        OracleError::InvalidConfig(err.to_string())
    }
}

impl From<CryptoError> for OracleError {
    fn from(err: CryptoError) -> Self {
        OracleError::KeyUnavailable(err.to_string())
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
