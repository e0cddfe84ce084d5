use std::sync::Arc;

use custody_crypto::{sha256, SigningKey};
use custody_types::{Digest32, Measurements, Nonce};
use rand::RngCore;

use crate::{
    sign_report, AttestationBackendKind, AttestationConfig, AttestationEngine, AttestationError,
    AttestationReport,
};

/// Software stand-in for an enclave: measurements are hashes of static seeds,
/// or random bytes fixed at construction.
pub struct SimulatedAttestation {
    key: Arc<SigningKey>,
    measurements: Measurements,
}

impl SimulatedAttestation {
    pub fn from_seeds(code_seed: &str, signer_seed: &str, key: Arc<SigningKey>) -> Self {
        Self {
            key,
            measurements: Measurements {
                code_identity: sha256(code_seed.as_bytes()),
                signer_identity: sha256(signer_seed.as_bytes()),
            },
        }
    }

    pub fn random(key: Arc<SigningKey>) -> Self {
        let mut rng = rand::thread_rng();
        let mut code = [0u8; 32];
        let mut signer = [0u8; 32];
        rng.fill_bytes(&mut code);
        rng.fill_bytes(&mut signer);
        Self {
            key,
            measurements: Measurements {
                code_identity: Digest32(code),
                signer_identity: Digest32(signer),
            },
        }
    }

    pub fn from_config(config: &AttestationConfig, key: Arc<SigningKey>) -> Self {
        if config.randomize {
            Self::random(key)
        } else {
            Self::from_seeds(&config.code_seed, &config.signer_seed, key)
        }
    }
}

impl AttestationEngine for SimulatedAttestation {
    fn backend(&self) -> AttestationBackendKind {
        AttestationBackendKind::Simulated
    }

    fn measure(&self) -> Measurements {
        self.measurements
    }

    fn attest(&self, challenge: &Nonce, timestamp: i64) -> Result<AttestationReport, AttestationError> {
        sign_report(&self.key, self.measurements, challenge, timestamp)
    }
}
