//! Custody Attestation - pluggable measurement and per-challenge reports.
//!
//! An [`AttestationEngine`] exposes two stable digests for the lifetime of the
//! process (code identity and signer identity) and signs per-challenge reports
//! with the oracle key. Verification is identical for every backend: the
//! identities must equal the ledger's [`TrustConfig`], the report challenge
//! must equal the permit nonce, and the report signature must verify.

#![deny(unsafe_code)]

mod platform;
mod simulated;

pub use platform::PlatformAttestation;
pub use simulated::SimulatedAttestation;

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use custody_crypto::{CryptoError, PublicKey, Signature, SigningKey};
use custody_types::{Digest32, Measurements, Nonce, ReasonCode, TrustConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Prefix of every signed report message.
pub const REPORT_DOMAIN: &[u8] = b"custody-attestation-v1";

pub const DEFAULT_CODE_SEED: &str = "DFIR-Enclave-Code-v1.0.0";
pub const DEFAULT_SIGNER_SEED: &str = "DFIR-Enclave-Signer-Key";

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("attestation mismatch: {0}")]
    Mismatch(String),

    #[error("measurement failed: {0}")]
    MeasurementFailed(String),

    #[error("report signing failed: {0}")]
    Signing(#[from] CryptoError),
}

impl AttestationError {
    pub fn code(&self) -> Option<ReasonCode> {
        match self {
            AttestationError::Mismatch(_) => Some(ReasonCode::AttestationMismatch),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationBackendKind {
    #[default]
    Simulated,
    Platform,
}

impl std::fmt::Display for AttestationBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttestationBackendKind::Simulated => f.write_str("simulated"),
            AttestationBackendKind::Platform => f.write_str("platform"),
        }
    }
}

/// Backend selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationConfig {
    #[serde(default)]
    pub backend: AttestationBackendKind,

    #[serde(default = "default_code_seed")]
    pub code_seed: String,

    #[serde(default = "default_signer_seed")]
    pub signer_seed: String,

    /// Draw simulated measurements from the CSPRNG instead of the seeds.
    #[serde(default)]
    pub randomize: bool,
}

fn default_code_seed() -> String {
    DEFAULT_CODE_SEED.to_string()
}

fn default_signer_seed() -> String {
    DEFAULT_SIGNER_SEED.to_string()
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            backend: AttestationBackendKind::default(),
            code_seed: default_code_seed(),
            signer_seed: default_signer_seed(),
            randomize: false,
        }
    }
}

/// Measurement report for one challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationReport {
    pub code_identity: Digest32,
    pub signer_identity: Digest32,
    pub timestamp: i64,
    pub challenge: Nonce,
    /// Base64url of the 64-byte ES256 signature over [`report_message`].
    pub signature: String,
}

impl AttestationReport {
    pub fn measurements(&self) -> Measurements {
        Measurements {
            code_identity: self.code_identity,
            signer_identity: self.signer_identity,
        }
    }
}

/// Measurement and report interface shared by all backends.
pub trait AttestationEngine: Send + Sync {
    fn backend(&self) -> AttestationBackendKind;

    /// Stable for the lifetime of the engine.
    fn measure(&self) -> Measurements;

    fn attest(&self, challenge: &Nonce, timestamp: i64)
        -> Result<AttestationReport, AttestationError>;
}

/// Build the configured backend around the oracle key.
pub fn build_engine(
    config: &AttestationConfig,
    key: Arc<SigningKey>,
) -> Result<Arc<dyn AttestationEngine>, AttestationError> {
    let engine: Arc<dyn AttestationEngine> = match config.backend {
        AttestationBackendKind::Simulated => Arc::new(SimulatedAttestation::from_config(config, key)),
        AttestationBackendKind::Platform => Arc::new(PlatformAttestation::new(key)?),
    };

    let measurements = engine.measure();
    info!(
        backend = %engine.backend(),
        code_identity = %measurements.code_identity.short(),
        signer_identity = %measurements.signer_identity.short(),
        "Attestation engine ready"
    );
    Ok(engine)
}

/// Canonical bytes covered by a report signature.
pub fn report_message(measurements: &Measurements, timestamp: i64, challenge: &Nonce) -> Vec<u8> {
    let challenge = challenge.as_bytes();
    let mut message = Vec::with_capacity(REPORT_DOMAIN.len() + 64 + 8 + 4 + challenge.len());
    message.extend_from_slice(REPORT_DOMAIN);
    message.extend_from_slice(measurements.code_identity.as_bytes());
    message.extend_from_slice(measurements.signer_identity.as_bytes());
    message.extend_from_slice(&timestamp.to_be_bytes());
    message.extend_from_slice(&(challenge.len() as u32).to_be_bytes());
    message.extend_from_slice(challenge);
    message
}

pub(crate) fn sign_report(
    key: &SigningKey,
    measurements: Measurements,
    challenge: &Nonce,
    timestamp: i64,
) -> Result<AttestationReport, AttestationError> {
    let signature = key.sign(&report_message(&measurements, timestamp, challenge))?;
    Ok(AttestationReport {
        code_identity: measurements.code_identity,
        signer_identity: measurements.signer_identity,
        timestamp,
        challenge: challenge.clone(),
        signature: URL_SAFE_NO_PAD.encode(signature.as_bytes()),
    })
}

/// Check a report against the trust anchor and the challenge it must answer.
pub fn verify_report(
    report: &AttestationReport,
    trust: &TrustConfig,
    expected_challenge: &Nonce,
    public_key: &PublicKey,
) -> Result<(), AttestationError> {
    if report.code_identity != trust.code_identity {
        return Err(AttestationError::Mismatch(format!(
            "code identity {} is not trusted",
            report.code_identity.short()
        )));
    }
    if report.signer_identity != trust.signer_identity {
        return Err(AttestationError::Mismatch(format!(
            "signer identity {} is not trusted",
            report.signer_identity.short()
        )));
    }
    if &report.challenge != expected_challenge {
        return Err(AttestationError::Mismatch(
            "report answers a different challenge".to_string(),
        ));
    }

    let raw = URL_SAFE_NO_PAD
        .decode(&report.signature)
        .map_err(|err| AttestationError::Mismatch(format!("report signature encoding: {}", err)))?;
    let signature = Signature::from_slice(&raw)
        .map_err(|err| AttestationError::Mismatch(err.to_string()))?;
    public_key
        .verify(
            &report_message(&report.measurements(), report.timestamp, &report.challenge),
            &signature,
        )
        .map_err(|_| AttestationError::Mismatch("report signature invalid".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<SigningKey>, Arc<dyn AttestationEngine>, TrustConfig) {
        let key = Arc::new(SigningKey::generate().unwrap());
        let engine = build_engine(&AttestationConfig::default(), key.clone()).unwrap();
        let trust = TrustConfig::new(key.public_key().to_hex(), engine.measure());
        (key, engine, trust)
    }

    #[test]
    fn report_verifies_against_its_challenge() {
        let (key, engine, trust) = setup();
        let challenge = Nonce::generate();
        let report = engine.attest(&challenge, 1_700_000_000).unwrap();
        verify_report(&report, &trust, &challenge, &key.public_key()).unwrap();
    }

    #[test]
    fn old_report_against_new_challenge_is_detected() {
        let (key, engine, trust) = setup();
        let report = engine.attest(&Nonce::generate(), 1).unwrap();
        let err = verify_report(&report, &trust, &Nonce::generate(), &key.public_key()).unwrap_err();
        assert_eq!(err.code(), Some(ReasonCode::AttestationMismatch));

        let mut rebound = report.clone();
        let fresh = Nonce::generate();
        rebound.challenge = fresh.clone();
        assert!(verify_report(&rebound, &trust, &fresh, &key.public_key()).is_err());
    }

    #[test]
    fn untrusted_identity_is_rejected() {
        let (key, engine, mut trust) = setup();
        let challenge = Nonce::generate();
        let report = engine.attest(&challenge, 1).unwrap();
        trust.code_identity = Digest32([0xaa; 32]);
        assert!(matches!(
            verify_report(&report, &trust, &challenge, &key.public_key()),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn report_signed_by_other_key_is_rejected() {
        let (_, engine, trust) = setup();
        let other = SigningKey::generate().unwrap();
        let challenge = Nonce::generate();
        let report = engine.attest(&challenge, 1).unwrap();
        assert!(verify_report(&report, &trust, &challenge, &other.public_key()).is_err());
    }

    #[test]
    fn timestamp_is_covered_by_signature() {
        let (key, engine, trust) = setup();
        let challenge = Nonce::generate();
        let mut report = engine.attest(&challenge, 100).unwrap();
        report.timestamp = 200;
        assert!(verify_report(&report, &trust, &challenge, &key.public_key()).is_err());
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let config: AttestationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AttestationConfig::default());
        let platform: AttestationConfig =
            serde_json::from_str(r#"{"backend":"platform"}"#).unwrap();
        assert_eq!(platform.backend, AttestationBackendKind::Platform);
    }
}
