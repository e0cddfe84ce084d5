use std::sync::Arc;

use custody_crypto::{sha256, SigningKey};
use custody_types::{Measurements, Nonce};
use tracing::debug;

use crate::{
    sign_report, AttestationBackendKind, AttestationEngine, AttestationError, AttestationReport,
};

/// Measures the running process: code identity is the digest of the executable
/// image, signer identity the digest of the oracle public key.
/// Not a hardware root of trust.
pub struct PlatformAttestation {
    key: Arc<SigningKey>,
    measurements: Measurements,
}

impl PlatformAttestation {
    pub fn new(key: Arc<SigningKey>) -> Result<Self, AttestationError> {
        let exe = std::env::current_exe()
            .map_err(|err| AttestationError::MeasurementFailed(err.to_string()))?;
        let image = std::fs::read(&exe).map_err(|err| {
            AttestationError::MeasurementFailed(format!("{}: {}", exe.display(), err))
        })?;
        debug!(path = %exe.display(), bytes = image.len(), "Measured executable image");

        Ok(Self::from_image(&image, key))
    }

    pub fn from_image(image: &[u8], key: Arc<SigningKey>) -> Self {
        let measurements = Measurements {
            code_identity: sha256(image),
            signer_identity: sha256(key.public_key().as_bytes()),
        };
        Self { key, measurements }
    }
}

impl AttestationEngine for PlatformAttestation {
    fn backend(&self) -> AttestationBackendKind {
        AttestationBackendKind::Platform
    }

    fn measure(&self) -> Measurements {
        self.measurements
    }

    fn attest(&self, challenge: &Nonce, timestamp: i64) -> Result<AttestationReport, AttestationError> {
        sign_report(&self.key, self.measurements, challenge, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_identity_follows_the_key() {
        let key = Arc::new(SigningKey::generate().unwrap());
        let other = Arc::new(SigningKey::generate().unwrap());
        let a = PlatformAttestation::from_image(b"image", key);
        let b = PlatformAttestation::from_image(b"image", other);
        assert_eq!(a.measure().code_identity, b.measure().code_identity);
        assert_ne!(a.measure().signer_identity, b.measure().signer_identity);
    }

    #[test]
    fn measures_the_test_binary() {
        let key = Arc::new(SigningKey::generate().unwrap());
        let engine = PlatformAttestation::new(key).unwrap();
        assert!(!engine.measure().code_identity.is_zero());
        assert_eq!(engine.backend(), AttestationBackendKind::Platform);
    }
}
