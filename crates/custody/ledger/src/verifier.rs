//! Permit verification inside the ledger.
//!
//! Nine checks run in a fixed order, cheapest first. The first failing check
//! decides the reason code; nothing is written unless all nine pass.

use custody_attestation::{verify_report, AttestationReport};
use custody_crypto::PublicKey;
use custody_permit::{DecisionPayload, DecodedPermit, Permit};
use custody_types::{Nonce, ReasonCode, TrustConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::keys;
use crate::tx::Transaction;

pub const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 300;
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 30;

/// What a client attaches to a guarded ledger invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitEnvelope {
    pub permit: Permit,
    /// Must equal the nonce inside the signed payload.
    pub nonce: Nonce,
    pub attestation: AttestationReport,
}

impl PermitEnvelope {
    pub fn new(permit: Permit, nonce: Nonce, attestation: AttestationReport) -> Self {
        Self {
            permit,
            nonce,
            attestation,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    pub freshness_window_secs: i64,
    /// Tolerated amount by which a permit timestamp may lead ledger time.
    pub clock_skew_secs: i64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }
}

/// Trust configuration with its public key already parsed.
#[derive(Clone, Debug)]
pub struct TrustAnchor {
    pub config: TrustConfig,
    pub public_key: PublicKey,
}

impl TrustAnchor {
    pub fn new(config: TrustConfig) -> LedgerResult<Self> {
        let public_key = PublicKey::from_hex(&config.public_key)
            .map_err(|err| LedgerError::InvalidArgument(format!("trust public key: {}", err)))?;
        if config.code_identity.is_zero() || config.signer_identity.is_zero() {
            return Err(LedgerError::InvalidArgument(
                "trust measurements cannot be zero".to_string(),
            ));
        }
        Ok(Self { config, public_key })
    }
}

/// What the invoked operation binds the permit to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expected<'a> {
    pub subject: &'a str,
    pub action: &'a str,
    pub resource: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerificationStage {
    Decode,
    Subject,
    ActionResource,
    NonceBinding,
    Replay,
    Freshness,
    Decision,
    Attestation,
    Signature,
}

impl VerificationStage {
    pub const ALL: [VerificationStage; 9] = [
        VerificationStage::Decode,
        VerificationStage::Subject,
        VerificationStage::ActionResource,
        VerificationStage::NonceBinding,
        VerificationStage::Replay,
        VerificationStage::Freshness,
        VerificationStage::Decision,
        VerificationStage::Attestation,
        VerificationStage::Signature,
    ];

    pub fn number(&self) -> u8 {
        match self {
            VerificationStage::Decode => 1,
            VerificationStage::Subject => 2,
            VerificationStage::ActionResource => 3,
            VerificationStage::NonceBinding => 4,
            VerificationStage::Replay => 5,
            VerificationStage::Freshness => 6,
            VerificationStage::Decision => 7,
            VerificationStage::Attestation => 8,
            VerificationStage::Signature => 9,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VerificationStage::Decode => "Decode",
            VerificationStage::Subject => "Subject",
            VerificationStage::ActionResource => "ActionResource",
            VerificationStage::NonceBinding => "NonceBinding",
            VerificationStage::Replay => "Replay",
            VerificationStage::Freshness => "Freshness",
            VerificationStage::Decision => "Decision",
            VerificationStage::Attestation => "Attestation",
            VerificationStage::Signature => "Signature",
        }
    }

    pub fn failure_code(&self) -> ReasonCode {
        match self {
            VerificationStage::Decode => ReasonCode::MalformedPermit,
            VerificationStage::Subject => ReasonCode::SubjectMismatch,
            VerificationStage::ActionResource => ReasonCode::ActionResourceMismatch,
            VerificationStage::NonceBinding => ReasonCode::NonceMismatch,
            VerificationStage::Replay => ReasonCode::NonceReplay,
            VerificationStage::Freshness => ReasonCode::PermitExpired,
            VerificationStage::Decision => ReasonCode::PolicyDenied,
            VerificationStage::Attestation => ReasonCode::AttestationMismatch,
            VerificationStage::Signature => ReasonCode::SignatureInvalid,
        }
    }
}

impl std::fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.number(), self.name())
    }
}

/// A failed check and why.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("permit rejected at stage {stage}: {message}")]
pub struct VerificationError {
    pub stage: VerificationStage,
    pub message: String,
}

impl VerificationError {
    fn new(stage: VerificationStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ReasonCode {
        self.stage.failure_code()
    }
}

/// A permit that passed every check.
#[derive(Clone, Debug)]
pub struct VerifiedPermit {
    pub payload: DecisionPayload,
    /// Hex SHA-256 of the signing input.
    pub permit_hash: String,
}

#[derive(Clone, Debug, Default)]
pub struct PermitVerifier {
    config: VerifierConfig,
}

impl PermitVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Run all checks. The replay check reads the nonce key through `tx`, so a
    /// concurrent consumer of the same nonce also conflicts at commit.
    pub fn verify(
        &self,
        tx: &mut Transaction<'_>,
        envelope: &PermitEnvelope,
        expected: &Expected<'_>,
        trust: &TrustAnchor,
        now: i64,
    ) -> LedgerResult<VerifiedPermit> {
        use VerificationStage as Stage;

        let decoded = DecodedPermit::decode(&envelope.permit)
            .map_err(|err| VerificationError::new(Stage::Decode, err.to_string()))?;
        pass(Stage::Decode);
        let payload = &decoded.payload;

        if payload.sub != expected.subject {
            return Err(VerificationError::new(
                Stage::Subject,
                format!("permit for '{}' submitted by '{}'", payload.sub, expected.subject),
            )
            .into());
        }
        pass(Stage::Subject);

        if payload.action != expected.action || payload.resource != expected.resource {
            return Err(VerificationError::new(
                Stage::ActionResource,
                format!(
                    "permit covers {} {}, operation needs {} {}",
                    payload.action, payload.resource, expected.action, expected.resource
                ),
            )
            .into());
        }
        pass(Stage::ActionResource);

        if payload.nonce != envelope.nonce {
            return Err(VerificationError::new(
                Stage::NonceBinding,
                "transaction nonce differs from signed nonce",
            )
            .into());
        }
        pass(Stage::NonceBinding);

        if tx.exists(&keys::nonce(&payload.nonce))? {
            return Err(VerificationError::new(
                Stage::Replay,
                format!("nonce {} already consumed", payload.nonce),
            )
            .into());
        }
        pass(Stage::Replay);

        let fresh = now.checked_sub(payload.timestamp).is_some_and(|age| {
            age <= self.config.freshness_window_secs && age >= -self.config.clock_skew_secs
        });
        if !fresh {
            return Err(VerificationError::new(
                Stage::Freshness,
                format!(
                    "permit issued at {} is outside the window at {}",
                    payload.timestamp, now
                ),
            )
            .into());
        }
        pass(Stage::Freshness);

        if !payload.decision.is_allow() {
            return Err(VerificationError::new(Stage::Decision, "permit decision is deny").into());
        }
        pass(Stage::Decision);

        if payload.mrenclave != trust.config.code_identity {
            return Err(VerificationError::new(
                Stage::Attestation,
                format!("permit code identity {} is not trusted", payload.mrenclave.short()),
            )
            .into());
        }
        verify_report(
            &envelope.attestation,
            &trust.config,
            &envelope.nonce,
            &trust.public_key,
        )
        .map_err(|err| VerificationError::new(Stage::Attestation, err.to_string()))?;
        pass(Stage::Attestation);

        decoded
            .verify_signature(&trust.public_key)
            .map_err(|err| VerificationError::new(Stage::Signature, err.to_string()))?;
        pass(Stage::Signature);

        Ok(VerifiedPermit {
            permit_hash: envelope.permit.digest(),
            payload: decoded.payload,
        })
    }
}

fn pass(stage: VerificationStage) {
    debug!(stage = %stage, "Verification stage passed");
}
