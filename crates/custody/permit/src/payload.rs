use custody_types::{Digest32, Nonce};
use serde::{Deserialize, Serialize};

use crate::PermitError;

/// Signed decision of the oracle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Allow => f.write_str("allow"),
            Decision::Deny => f.write_str("deny"),
        }
    }
}

/// The payload part of a permit. Every field is inside the signature's scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub sub: String,
    pub action: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance: Option<u8>,
    pub decision: Decision,
    pub timestamp: i64,
    pub nonce: Nonce,
    /// Code identity of the signing oracle.
    pub mrenclave: Digest32,
}

impl DecisionPayload {
    /// Required-field check run before signing and after decoding.
    pub fn validate(&self) -> Result<(), PermitError> {
        let missing = if self.sub.trim().is_empty() {
            Some("sub")
        } else if self.action.trim().is_empty() {
            Some("action")
        } else if self.resource.trim().is_empty() {
            Some("resource")
        } else if self.nonce.is_empty() {
            Some("nonce")
        } else if self.mrenclave.is_zero() {
            Some("mrenclave")
        } else {
            None
        };

        match missing {
            Some(field) => Err(PermitError::InvalidPayload(format!(
                "missing required field '{}'",
                field
            ))),
            None => Ok(()),
        }
    }
}
