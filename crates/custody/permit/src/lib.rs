//! Custody Permit - the only artifact that crosses the trust boundary.
//!
//! A permit is a compact-JWS style triple of independently base64url encoded
//! parts: a fixed header, a [`DecisionPayload`] and a 64-byte ES256 signature
//! over `header + "." + payload`.

#![deny(unsafe_code)]

mod payload;

pub use payload::{Decision, DecisionPayload};

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use custody_crypto::{sha256_hex, CryptoError, PublicKey, Signature, SigningKey, ALGORITHM};
use custody_types::ReasonCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Token type carried in every header.
pub const TOKEN_TYPE: &str = "JWT";

/// Permit errors
#[derive(Debug, Error)]
pub enum PermitError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("malformed permit: {0}")]
    MalformedPermit(String),

    #[error("permit signature invalid")]
    SignatureInvalid,

    #[error("signing error: {0}")]
    Signing(#[from] CryptoError),
}

impl PermitError {
    /// Reason code for protocol failures; `None` for local key failures.
    pub fn code(&self) -> Option<ReasonCode> {
        match self {
            PermitError::InvalidPayload(_) => Some(ReasonCode::InvalidPayload),
            PermitError::MalformedPermit(_) => Some(ReasonCode::MalformedPermit),
            PermitError::SignatureInvalid => Some(ReasonCode::SignatureInvalid),
            PermitError::Signing(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitHeader {
    pub alg: String,
    pub typ: String,
}

impl Default for PermitHeader {
    fn default() -> Self {
        Self {
            alg: ALGORITHM.to_string(),
            typ: TOKEN_TYPE.to_string(),
        }
    }
}

/// Wire form of a permit: three base64url strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    pub header: String,
    pub payload: String,
    pub signature: String,
}

impl Permit {
    /// The exact bytes covered by the signature.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }

    /// Hex SHA-256 of the signing input, recorded next to the effects it authorized.
    pub fn digest(&self) -> String {
        sha256_hex(self.signing_input().as_bytes())
    }

    /// Compact `header.payload.signature` form.
    pub fn compact(&self) -> String {
        format!("{}.{}.{}", self.header, self.payload, self.signature)
    }

    pub fn from_compact(token: &str) -> Result<Self, PermitError> {
        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(payload), Some(signature), None) => Ok(Self {
                header: header.to_string(),
                payload: payload.to_string(),
                signature: signature.to_string(),
            }),
            _ => Err(PermitError::MalformedPermit(
                "expected three dot-separated parts".to_string(),
            )),
        }
    }
}

/// Produces permits with the oracle's signing key.
#[derive(Clone)]
pub struct PermitSigner {
    key: Arc<SigningKey>,
}

impl PermitSigner {
    pub fn new(key: Arc<SigningKey>) -> Self {
        Self { key }
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    pub fn sign(&self, payload: &DecisionPayload) -> Result<Permit, PermitError> {
        payload.validate()?;

        let header = encode_json(&PermitHeader::default())?;
        let body = encode_json(payload)?;
        let signing_input = format!("{}.{}", header, body);
        let signature = self.key.sign(signing_input.as_bytes())?;

        debug!(
            sub = %payload.sub,
            action = %payload.action,
            resource = %payload.resource,
            decision = %payload.decision,
            "Permit signed"
        );

        Ok(Permit {
            header,
            payload: body,
            signature: URL_SAFE_NO_PAD.encode(signature.as_bytes()),
        })
    }
}

impl std::fmt::Debug for PermitSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitSigner")
            .field("public_key", &self.key.public_key())
            .finish()
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, PermitError> {
    let json = serde_json::to_vec(value)
        .map_err(|err| PermitError::InvalidPayload(err.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_json<T: for<'de> Deserialize<'de>>(part: &str, name: &str) -> Result<T, PermitError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|err| PermitError::MalformedPermit(format!("{} encoding: {}", name, err)))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| PermitError::MalformedPermit(format!("{} json: {}", name, err)))
}

/// A structurally valid permit whose signature has not been checked yet.
#[derive(Clone, Debug)]
pub struct DecodedPermit {
    pub header: PermitHeader,
    pub payload: DecisionPayload,
    signing_input: String,
    signature: Signature,
}

impl DecodedPermit {
    pub fn decode(permit: &Permit) -> Result<Self, PermitError> {
        let header: PermitHeader = decode_json(&permit.header, "header")?;
        if header.alg != ALGORITHM {
            return Err(PermitError::MalformedPermit(format!(
                "unsupported algorithm '{}'",
                header.alg
            )));
        }

        let payload: DecisionPayload = decode_json(&permit.payload, "payload")?;
        payload
            .validate()
            .map_err(|err| PermitError::MalformedPermit(err.to_string()))?;

        let raw = URL_SAFE_NO_PAD
            .decode(&permit.signature)
            .map_err(|err| PermitError::MalformedPermit(format!("signature encoding: {}", err)))?;
        let signature = Signature::from_slice(&raw)
            .map_err(|err| PermitError::MalformedPermit(err.to_string()))?;

        Ok(Self {
            header,
            payload,
            signing_input: permit.signing_input(),
            signature,
        })
    }

    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    pub fn verify_signature(&self, key: &PublicKey) -> Result<(), PermitError> {
        key.verify(self.signing_input.as_bytes(), &self.signature)
            .map_err(|_| PermitError::SignatureInvalid)
    }
}
