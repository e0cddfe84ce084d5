//! Custody Oracle - the private side of the split-trust protocol.
//!
//! The oracle owns everything the public ledger must never see: the user
//! table, the policy rules and the signing key. It answers policy questions and
//! turns allow decisions into signed, attested permits. All state is built once
//! by [`AuthorizationOracle::initialize`] and is read-only afterwards, so the
//! oracle can be shared behind an `Arc` without locking.

#![deny(unsafe_code)]

mod clock;
mod config;
mod error;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::OracleConfig;
pub use error::{OracleError, OracleResult};

use std::collections::HashMap;
use std::sync::Arc;

use custody_attestation::{build_engine, AttestationEngine, AttestationReport};
use custody_crypto::{SigningKey, ALGORITHM};
use custody_permit::{Decision, DecisionPayload, Permit, PermitSigner};
use custody_policy::PolicyEngine;
use custody_types::{Clearance, Measurements, Nonce, TrustConfig, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// `EvaluatePolicy` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub subject: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub clearance: Option<u8>,
}

/// Decision and a human-readable reason; never the matched rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResponse {
    pub allow: bool,
    pub reason: String,
}

/// `GetSignedPermit` request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitRequest {
    pub subject: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub clearance: Option<u8>,
    /// Caller's view of the decision. Ignored: the oracle re-evaluates.
    #[serde(default)]
    pub decision: Option<Decision>,
    pub nonce: Nonce,
}

/// Permit plus the attestation report answering the permit's nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPermit {
    pub permit: Permit,
    pub attestation: AttestationReport,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    pub public_key_hex: String,
    pub key_type: String,
}

struct Evaluation {
    allow: bool,
    reason: String,
    clearance: Option<Clearance>,
}

/// Policy decision point and permit issuer.
pub struct AuthorizationOracle {
    users: HashMap<String, User>,
    policy: PolicyEngine,
    signer: PermitSigner,
    attestation: Arc<dyn AttestationEngine>,
    clock: Arc<dyn Clock>,
}

impl AuthorizationOracle {
    /// Build the oracle from an administrator snapshot using the wall clock.
    pub fn initialize(config: OracleConfig) -> OracleResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build the oracle; either every component is ready or an error is returned.
    pub fn with_clock(config: OracleConfig, clock: Arc<dyn Clock>) -> OracleResult<Self> {
        let mut users = HashMap::with_capacity(config.users.len());
        for user in config.users {
            if user.id.trim().is_empty() {
                return Err(OracleError::InvalidConfig("user id cannot be empty".into()));
            }
            if users.contains_key(&user.id) {
                return Err(OracleError::InvalidConfig(format!(
                    "duplicate user id '{}'",
                    user.id
                )));
            }
            debug!(user = %user.id, role = %user.role, clearance = %user.clearance, "Loaded user");
            users.insert(user.id.clone(), user);
        }

        let policy = PolicyEngine::new(config.policies)?;

        let key = match &config.signing_key_path {
            Some(path) => SigningKey::from_pkcs8_file(path)?,
            None => SigningKey::generate()?,
        };
        let key = Arc::new(key);
        let attestation = build_engine(&config.attestation, key.clone())?;
        let signer = PermitSigner::new(key);

        info!(
            users = users.len(),
            policies = policy.len(),
            backend = %attestation.backend(),
            code_identity = %attestation.measure().code_identity.short(),
            "Authorization oracle initialized"
        );

        Ok(Self {
            users,
            policy,
            signer,
            attestation,
            clock,
        })
    }

    /// Evaluate a request; role and clearance come from the user table.
    pub fn evaluate_policy(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
        clearance: Option<u8>,
    ) -> PolicyResponse {
        let evaluation = self.evaluate(subject, action, resource, clearance);
        PolicyResponse {
            allow: evaluation.allow,
            reason: evaluation.reason,
        }
    }

    /// Re-derive the decision and, on allow, return a signed and attested permit.
    pub fn get_signed_permit(&self, request: &PermitRequest) -> OracleResult<SignedPermit> {
        if request.nonce.is_empty() {
            return Err(OracleError::InvalidRequest("nonce cannot be empty".into()));
        }

        let evaluation = self.evaluate(
            &request.subject,
            &request.action,
            &request.resource,
            request.clearance,
        );
        if !evaluation.allow {
            if request.decision.is_some_and(|d| d.is_allow()) {
                warn!(
                    subject = %request.subject,
                    action = %request.action,
                    resource = %request.resource,
                    "Caller asserted allow for a denied request"
                );
            }
            return Err(OracleError::PolicyDenied(evaluation.reason));
        }

        let timestamp = self.clock.now();
        let payload = DecisionPayload {
            sub: request.subject.clone(),
            action: request.action.clone(),
            resource: request.resource.clone(),
            clearance: evaluation.clearance.map(|c| c.level()),
            decision: Decision::Allow,
            timestamp,
            nonce: request.nonce.clone(),
            mrenclave: self.attestation.measure().code_identity,
        };

        let permit = self.signer.sign(&payload)?;
        let attestation = self.attestation.attest(&request.nonce, timestamp)?;

        info!(
            subject = %request.subject,
            action = %request.action,
            resource = %request.resource,
            timestamp,
            "Permit issued"
        );

        Ok(SignedPermit { permit, attestation })
    }

    pub fn public_key(&self) -> PublicKeyInfo {
        PublicKeyInfo {
            public_key_hex: self.signer.public_key().to_hex(),
            key_type: ALGORITHM.to_string(),
        }
    }

    /// Fresh report for an arbitrary challenge.
    pub fn get_attestation(&self, challenge: &Nonce) -> OracleResult<AttestationReport> {
        if challenge.is_empty() {
            return Err(OracleError::InvalidRequest("challenge cannot be empty".into()));
        }
        Ok(self.attestation.attest(challenge, self.clock.now())?)
    }

    pub fn measurements(&self) -> Measurements {
        self.attestation.measure()
    }

    /// Verification material an administrator installs on the ledger.
    pub fn trust_config(&self) -> TrustConfig {
        let mut trust = TrustConfig::new(self.signer.public_key().to_hex(), self.measurements());
        trust.updated_at = self.clock.now();
        trust
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    fn evaluate(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
        requested: Option<u8>,
    ) -> Evaluation {
        let Some(user) = self.users.get(subject) else {
            info!(subject, action, resource, "Policy DENY: unknown subject");
            return Evaluation::deny("unknown subject".to_string());
        };

        let clearance = match requested.map(Clearance::new).transpose() {
            Ok(Some(requested)) => requested.min(user.clearance),
            Ok(None) => user.clearance,
            Err(err) => {
                info!(subject, action, resource, "Policy DENY: {}", err);
                return Evaluation::deny(err.to_string());
            }
        };

        let decision = self.policy.evaluate_with(user.role, clearance, action, resource);
        if decision.allow {
            info!(subject, role = %user.role, action, resource, "Policy ALLOW");
            Evaluation {
                allow: true,
                reason: format!("{} may {} {}", user.role, action, resource),
                clearance: Some(clearance),
            }
        } else {
            info!(subject, role = %user.role, clearance = %clearance, action, resource, "Policy DENY");
            Evaluation::deny("no matching policy".to_string())
        }
    }
}

impl Evaluation {
    fn deny(reason: String) -> Self {
        Self {
            allow: false,
            reason,
            clearance: None,
        }
    }
}

impl std::fmt::Debug for AuthorizationOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationOracle")
            .field("users", &self.users.len())
            .field("policies", &self.policy.len())
            .field("backend", &self.attestation.backend())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_attestation::verify_report;
    use custody_crypto::PublicKey;
    use custody_permit::DecodedPermit;
    use custody_types::{PolicyRule, ReasonCode, Role};

    fn user(id: &str, role: Role, clearance: u8) -> User {
        User::new(id, role, Clearance::new(clearance).unwrap())
    }

    fn oracle() -> (AuthorizationOracle, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(1_700_000_000));
        let config = OracleConfig::with_users(vec![
            user("inv001", Role::Investigator, 2),
            user("aud001", Role::Auditor, 3),
            user("admin", Role::Admin, 4),
        ]);
        (AuthorizationOracle::with_clock(config, clock.clone()).unwrap(), clock)
    }

    fn request(subject: &str, action: &str, resource: &str) -> PermitRequest {
        PermitRequest {
            subject: subject.into(),
            action: action.into(),
            resource: resource.into(),
            clearance: None,
            decision: None,
            nonce: Nonce::generate(),
        }
    }

    #[test]
    fn investigator_may_create_evidence() {
        let (oracle, _) = oracle();
        let response = oracle.evaluate_policy("inv001", "create", "evidence/EVD-001", None);
        assert!(response.allow);
        assert!(!response.reason.contains("min_clearance"));
    }

    #[test]
    fn unknown_subject_is_denied() {
        let (oracle, _) = oracle();
        let response = oracle.evaluate_policy("ghost", "read", "evidence/EVD-001", None);
        assert!(!response.allow);
        assert_eq!(response.reason, "unknown subject");
    }

    #[test]
    fn supplied_clearance_can_only_lower() {
        let (oracle, _) = oracle();
        assert!(!oracle.evaluate_policy("inv001", "create", "evidence/E", Some(1)).allow);
        assert!(oracle.evaluate_policy("inv001", "create", "evidence/E", Some(4)).allow);
        assert!(!oracle.evaluate_policy("inv001", "create", "evidence/E", Some(0)).allow);
    }

    #[test]
    fn auditor_cannot_create() {
        let (oracle, _) = oracle();
        assert!(oracle.evaluate_policy("aud001", "read", "evidence/E", None).allow);
        assert!(!oracle.evaluate_policy("aud001", "create", "evidence/E", None).allow);
    }

    #[test]
    fn permit_is_signed_attested_and_bound() {
        let (oracle, clock) = oracle();
        let req = request("inv001", "create", "evidence/EVD-001");
        let signed = oracle.get_signed_permit(&req).unwrap();

        let decoded = DecodedPermit::decode(&signed.permit).unwrap();
        let key = PublicKey::from_hex(&oracle.public_key().public_key_hex).unwrap();
        decoded.verify_signature(&key).unwrap();
        assert_eq!(decoded.payload.sub, "inv001");
        assert_eq!(decoded.payload.nonce, req.nonce);
        assert_eq!(decoded.payload.timestamp, clock.now());
        assert_eq!(decoded.payload.clearance, Some(2));
        assert_eq!(decoded.payload.mrenclave, oracle.measurements().code_identity);

        verify_report(&signed.attestation, &oracle.trust_config(), &req.nonce, &key).unwrap();
    }

    #[test]
    fn denied_request_is_not_signed_even_when_caller_claims_allow() {
        let (oracle, _) = oracle();
        let mut req = request("aud001", "create", "evidence/EVD-001");
        req.decision = Some(Decision::Allow);
        let err = oracle.get_signed_permit(&req).unwrap_err();
        assert_eq!(err.code(), Some(ReasonCode::PolicyDenied));
    }

    #[test]
    fn empty_nonce_is_invalid() {
        let (oracle, _) = oracle();
        let mut req = request("inv001", "create", "evidence/EVD-001");
        req.nonce = Nonce::from_bytes(Vec::new());
        let err = oracle.get_signed_permit(&req).unwrap_err();
        assert_eq!(err.code(), Some(ReasonCode::InvalidPayload));
    }

    #[test]
    fn duplicate_users_fail_initialization() {
        let config = OracleConfig::with_users(vec![
            user("inv001", Role::Investigator, 2),
            user("inv001", Role::Admin, 4),
        ]);
        assert!(matches!(
            AuthorizationOracle::initialize(config),
            Err(OracleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_policy_pattern_fails_initialization() {
        let mut config = OracleConfig::with_users(vec![user("a", Role::Admin, 1)]);
        config.policies = vec![PolicyRule::new(Role::Admin, "*", "read", Clearance::MIN)];
        assert!(matches!(
            AuthorizationOracle::initialize(config),
            Err(OracleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_key_file_fails_initialization() {
        let mut config = OracleConfig::default();
        config.signing_key_path = Some("/nonexistent/oracle.p8".into());
        assert!(matches!(
            AuthorizationOracle::initialize(config),
            Err(OracleError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn measurements_are_stable_and_exposed_without_secrets() {
        let (oracle, _) = oracle();
        assert_eq!(oracle.measurements(), oracle.measurements());
        let info = oracle.public_key();
        assert_eq!(info.key_type, "ES256");
        assert_eq!(info.public_key_hex.len(), 130);

        let challenge = Nonce::generate();
        let report = oracle.get_attestation(&challenge).unwrap();
        assert_eq!(report.challenge, challenge);
        assert_eq!(report.measurements(), oracle.measurements());
    }

    #[test]
    fn concurrent_permit_requests_share_the_oracle() {
        let (oracle, _) = oracle();
        let oracle = Arc::new(oracle);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let oracle = oracle.clone();
                std::thread::spawn(move || {
                    let req = request("inv001", "read", &format!("evidence/EVD-{}", i));
                    oracle.get_signed_permit(&req).map(|signed| signed.permit)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    }
}
