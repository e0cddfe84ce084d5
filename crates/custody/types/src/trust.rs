use serde::{Deserialize, Serialize};

use crate::TypeError;

/// A 32-byte digest (code identity, signer identity), hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest32(pub [u8; 32]);

impl Digest32 {
    pub const ZERO: Digest32 = Digest32([0u8; 32]);

    pub fn from_hex(encoded: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|err| TypeError::InvalidDigest(err.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| TypeError::InvalidDigest(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(array))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// First eight bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl std::fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest32({})", self.to_hex())
    }
}

impl std::fmt::Display for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest32 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Digest32::from_hex(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Stable identity of a running oracle instance (MRENCLAVE / MRSIGNER analogues).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurements {
    pub code_identity: Digest32,
    pub signer_identity: Digest32,
}

/// Trust anchor installed on the ledger by governance.
///
/// The oracle can read it but never change it: updates require a
/// multi-party governance quorum on the ledger side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Hex of the 65-byte uncompressed P-256 point.
    pub public_key: String,
    pub code_identity: Digest32,
    pub signer_identity: Digest32,
    #[serde(default)]
    pub updated_at: i64,
}

impl TrustConfig {
    pub fn new(public_key: impl Into<String>, measurements: Measurements) -> Self {
        Self {
            public_key: public_key.into(),
            code_identity: measurements.code_identity,
            signer_identity: measurements.signer_identity,
            updated_at: 0,
        }
    }

    pub fn measurements(&self) -> Measurements {
        Measurements {
            code_identity: self.code_identity,
            signer_identity: self.signer_identity,
        }
    }
}
