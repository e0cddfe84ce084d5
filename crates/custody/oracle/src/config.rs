use std::path::PathBuf;

use custody_attestation::AttestationConfig;
use custody_policy::default_rules;
use custody_types::{PolicyRule, User};
use serde::{Deserialize, Serialize};

/// Administrator snapshot the oracle is built from.
///
/// Held in memory only. Restarting the process discards it and a new
/// snapshot must be supplied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default = "default_rules")]
    pub policies: Vec<PolicyRule>,

    #[serde(default)]
    pub attestation: AttestationConfig,

    /// PKCS#8 DER key; a fresh key is generated when unset.
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            policies: default_rules(),
            attestation: AttestationConfig::default(),
            signing_key_path: None,
        }
    }
}

impl OracleConfig {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users,
            ..Self::default()
        }
    }
}
