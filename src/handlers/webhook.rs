//! Provider callback endpoints.
//!
//! Each provider has its own payload shape; these handlers translate to the
//! canonical callback and hand it to the reconciler. Whatever the reconciler
//! decides, the provider gets a 200 so redelivery stops. A payload that does
//! not even parse is the one case that earns a 400.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::domain::Provider;
use crate::error::AppError;
use crate::services::{CallbackOutcome, ProviderCallback, ReconcileOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MtnCallbackPayload {
    pub reference_id: String,
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AirtelCallbackPayload {
    pub transaction: AirtelTransaction,
}

#[derive(Debug, Deserialize)]
pub struct AirtelTransaction {
    pub id: String,
    pub status: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
struct Ack {
    acknowledged: bool,
    outcome: &'static str,
}

fn ack(outcome: ReconcileOutcome) -> impl IntoResponse {
    let outcome = match outcome {
        ReconcileOutcome::Applied => "applied",
        ReconcileOutcome::DuplicateIgnored => "duplicate_ignored",
        ReconcileOutcome::Conflict => "queued_for_review",
        ReconcileOutcome::Unknown => "queued_for_review",
    };
    (
        StatusCode::OK,
        Json(Ack {
            acknowledged: true,
            outcome,
        }),
    )
}

pub async fn mtn_callback(
    State(state): State<AppState>,
    Json(payload): Json<MtnCallbackPayload>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = match payload.status.as_str() {
        "SUCCESSFUL" => CallbackOutcome::Successful,
        "FAILED" => CallbackOutcome::Failed,
        other => {
            // Interim statuses carry no outcome; ACK and wait for the final
            // delivery.
            tracing::info!(
                reference_id = payload.reference_id,
                status = other,
                "non-terminal callback status, ignoring"
            );
            return Ok((
                StatusCode::OK,
                Json(json!({ "acknowledged": true, "outcome": "ignored" })),
            )
                .into_response());
        }
    };

    let result = state
        .reconciler
        .reconcile(ProviderCallback {
            provider: Provider::Mtn,
            provider_reference: payload.reference_id,
            outcome,
            reason: payload.reason,
        })
        .await?;
    Ok(ack(result).into_response())
}

pub async fn airtel_callback(
    State(state): State<AppState>,
    Json(payload): Json<AirtelCallbackPayload>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = match payload.transaction.status.as_str() {
        "TS" => CallbackOutcome::Successful,
        "TF" => CallbackOutcome::Failed,
        other => {
            tracing::info!(
                reference_id = payload.transaction.id,
                status = other,
                "non-terminal callback status, ignoring"
            );
            return Ok((
                StatusCode::OK,
                Json(json!({ "acknowledged": true, "outcome": "ignored" })),
            )
                .into_response());
        }
    };

    let result = state
        .reconciler
        .reconcile(ProviderCallback {
            provider: Provider::Airtel,
            provider_reference: payload.transaction.id,
            outcome,
            reason: payload.transaction.message,
        })
        .await?;
    Ok(ack(result).into_response())
}
