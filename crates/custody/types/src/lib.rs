//! Custody Types - the shared vocabulary of the split-trust custody system.
//!
//! The private oracle and the public ledger never share code paths beyond this
//! crate: identities, rules, permit nonces, measurement digests, evidence
//! records and the reason-code taxonomy both sides report failures in.

#![deny(unsafe_code)]

mod evidence;
mod reason;
mod trust;

pub use evidence::{CustodyTransferEntry, EvidenceRecord, NewEvidence, NonceConsumption};
pub use reason::ReasonCode;
pub use trust::{Digest32, Measurements, TrustConfig};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recommended nonce length in bytes.
pub const NONCE_LEN: usize = 32;

/// Errors raised while constructing shared values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("clearance must be between 1 and 4, got {0}")]
    InvalidClearance(u8),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("invalid nonce encoding: {0}")]
    InvalidNonce(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

/// Role assigned to a user by the administrator snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Investigator,
    Auditor,
    Court,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Investigator => "investigator",
            Role::Auditor => "auditor",
            Role::Court => "court",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Role {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "investigator" => Ok(Role::Investigator),
            "auditor" => Ok(Role::Auditor),
            "court" => Ok(Role::Court),
            other => Err(TypeError::UnknownRole(other.to_string())),
        }
    }
}

/// Access tier of a user, always within 1..=4.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Clearance(u8);

impl Clearance {
    pub const MIN: Clearance = Clearance(1);
    pub const MAX: Clearance = Clearance(4);

    pub fn new(level: u8) -> Result<Self, TypeError> {
        if (1..=4).contains(&level) {
            Ok(Self(level))
        } else {
            Err(TypeError::InvalidClearance(level))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Clearance {
    type Error = TypeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Clearance> for u8 {
    fn from(value: Clearance) -> Self {
        value.0
    }
}

impl std::fmt::Display for Clearance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user known to the oracle. Immutable for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: Role,
    pub clearance: Clearance,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role, clearance: Clearance) -> Self {
        Self {
            id: id.into(),
            role,
            clearance,
        }
    }
}

/// Role-based allow rule. There are no deny rules: absence of a match denies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub role: Role,
    pub resource_pattern: String,
    pub action: String,
    pub min_clearance: Clearance,
}

impl PolicyRule {
    pub fn new(
        role: Role,
        resource_pattern: impl Into<String>,
        action: impl Into<String>,
        min_clearance: Clearance,
    ) -> Self {
        Self {
            role,
            resource_pattern: resource_pattern.into(),
            action: action.into(),
            min_clearance,
        }
    }
}

/// Single-use value binding one permit to one ledger transaction.
///
/// Serialized as unpadded base64url so it can travel inside the permit payload
/// and double as a world-state key suffix.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nonce(Vec<u8>);

impl Nonce {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Fresh random nonce of [`NONCE_LEN`] bytes.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn decode(encoded: &str) -> Result<Self, TypeError> {
        URL_SAFE_NO_PAD
            .decode(encoded)
            .map(Self)
            .map_err(|err| TypeError::InvalidNonce(err.to_string()))
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({})", self.encode())
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for Nonce {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Nonce::decode(&encoded).map_err(serde::de::Error::custom)
    }
}
