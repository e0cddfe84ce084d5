//! Oracle RPC handlers

use crate::api::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{extract::State, Json};
use custody_attestation::AttestationReport;
use custody_oracle::{PermitRequest, PolicyRequest, PolicyResponse, PublicKeyInfo, SignedPermit};
use custody_types::{Nonce, TrustConfig};
use serde::{Deserialize, Serialize};

/// Attestation challenge request
#[derive(Debug, Serialize, Deserialize)]
pub struct AttestationRequest {
    pub challenge: Nonce,
}

/// Evaluate a request without issuing anything
pub async fn evaluate_policy(
    State(state): State<AppState>,
    Json(request): Json<PolicyRequest>,
) -> ApiResult<Json<PolicyResponse>> {
    if request.subject.is_empty() || request.action.is_empty() || request.resource.is_empty() {
        return Err(ApiError::BadRequest(
            "subject, action and resource are required".to_string(),
        ));
    }

    let response = state.oracle.evaluate_policy(
        &request.subject,
        &request.action,
        &request.resource,
        request.clearance,
    );
    Ok(Json(response))
}

/// Issue a signed, attested permit
pub async fn issue_permit(
    State(state): State<AppState>,
    Json(request): Json<PermitRequest>,
) -> ApiResult<Json<SignedPermit>> {
    let signed = state.oracle.get_signed_permit(&request)?;
    Ok(Json(signed))
}

pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyInfo> {
    Json(state.oracle.public_key())
}

/// Answer an attestation challenge
pub async fn attestation(
    State(state): State<AppState>,
    Json(request): Json<AttestationRequest>,
) -> ApiResult<Json<AttestationReport>> {
    let report = state.oracle.get_attestation(&request.challenge)?;
    Ok(Json(report))
}

/// Trust material an administrator installs on the ledger
pub async fn trust_config(State(state): State<AppState>) -> Json<TrustConfig> {
    Json(state.oracle.trust_config())
}
