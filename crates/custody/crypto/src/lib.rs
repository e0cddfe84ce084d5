//! Custody Crypto - the single signing primitive used across the trust boundary.
//!
//! ES256: ECDSA over NIST P-256 with a SHA-256 digest. Signatures are always the
//! fixed 64-byte `R || S` encoding (never DER) so the verifier can parse them
//! with a constant shape. Public keys travel as the 65-byte uncompressed point.

#![deny(unsafe_code)]

use std::path::Path;

use custody_types::Digest32;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, KeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_FIXED,
    ECDSA_P256_SHA256_FIXED_SIGNING,
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// JWS algorithm identifier for this primitive.
pub const ALGORITHM: &str = "ES256";
/// Length of a fixed-size `R || S` signature.
pub const SIGNATURE_LEN: usize = 64;
/// Length of an uncompressed P-256 public key (`0x04 || X || Y`).
pub const PUBLIC_KEY_LEN: usize = 65;

/// Crypto-level errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("signing failed")]
    SigningFailed,

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature length: expected 64, got {0}")]
    InvalidSignatureLength(usize),

    #[error("signature verification failed")]
    SignatureInvalid,
}

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Digest32 {
    Digest32(Sha256::digest(data).into())
}

/// Hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    sha256(data).to_hex()
}

/// ES256 private key held by the oracle.
///
/// The PKCS#8 document is kept only so the key can be exported for tests and
/// is zeroized on drop. Nothing in this crate writes it to disk.
pub struct SigningKey {
    pkcs8: Zeroizing<Vec<u8>>,
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl SigningKey {
    /// Generate a fresh in-memory key.
    pub fn generate() -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|_| CryptoError::KeyUnavailable("key generation failed".to_string()))?;
        Self::from_pkcs8(document.as_ref())
    }

    /// Load a key from a PKCS#8 v1/v2 DER document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, CryptoError> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
            .map_err(|err| CryptoError::KeyUnavailable(err.to_string()))?;
        Ok(Self {
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
            key_pair,
            rng,
        })
    }

    /// Load a PKCS#8 DER key file.
    pub fn from_pkcs8_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path = path.as_ref();
        let bytes = Zeroizing::new(std::fs::read(path).map_err(|err| {
            CryptoError::KeyUnavailable(format!("{}: {}", path.display(), err))
        })?);
        Self::from_pkcs8(&bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes.copy_from_slice(self.key_pair.public_key().as_ref());
        PublicKey(bytes)
    }

    /// Sign `message`; the digest is SHA-256 and the ECDSA nonce is random.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        let signature = self
            .key_pair
            .sign(&self.rng, message)
            .map_err(|_| CryptoError::SigningFailed)?;
        Signature::from_slice(signature.as_ref())
    }

    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Uncompressed P-256 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != 0x04 {
            return Err(CryptoError::InvalidPublicKey(
                "expected uncompressed point prefix 0x04".to_string(),
            ));
        }
        let mut key = [0u8; PUBLIC_KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|err| CryptoError::InvalidPublicKey(err.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Verify a fixed-size ES256 signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, &self.0[..])
            .verify(message, signature.as_bytes())
            .map_err(|_| CryptoError::SignatureInvalid)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}...)", hex::encode(&self.0[..16]))
    }
}

/// Fixed 64-byte `R || S` signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..8]))
    }
}
