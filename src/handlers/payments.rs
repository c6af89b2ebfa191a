use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Provider, Transaction, TransactionKind};
use crate::error::AppError;
use crate::services::PaymentRequest;
use crate::validation::{
    check_provider_prefix, validate_amount, validate_idempotency_key, validate_phone_number,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    pub ride_id: Option<String>,
    pub payment_method: Provider,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentResponse {
    pub success: bool,
    pub transaction_id: Uuid,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub transaction_id: Uuid,
    pub status: &'static str,
    pub kind: TransactionKind,
    pub provider: Provider,
    pub phone_number: String,
    pub amount: BigDecimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_reference: Option<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<String>,
}

impl From<Transaction> for PaymentView {
    fn from(tx: Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            status: tx.public_status(),
            kind: tx.kind,
            provider: tx.provider,
            phone_number: tx.counterparty_phone,
            amount: tx.amount,
            currency: tx.currency,
            provider_reference: tx.provider_reference,
            retry_count: tx.retry_count,
            failure_reason: tx.failure_reason.map(|r| r.as_str()),
            ride_id: tx.ride_id,
        }
    }
}

/// Start collecting a ride fare from the customer. Responds as soon as the
/// transaction is accepted into the pipeline; confirmation arrives later.
pub async fn process_payment(
    State(state): State<AppState>,
    Json(payload): Json<ProcessPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_phone_number(&payload.phone_number)?;
    validate_amount(&payload.amount)?;
    if let Some(key) = &payload.idempotency_key {
        validate_idempotency_key(key)?;
    }
    check_provider_prefix(&payload.phone_number, payload.payment_method);

    let tx = state
        .processor
        .submit(PaymentRequest {
            ride_id: payload.ride_id,
            kind: TransactionKind::Collection,
            provider: payload.payment_method,
            phone: payload.phone_number,
            amount: payload.amount,
            idempotency_key: payload.idempotency_key,
        })
        .await?;

    let response = ProcessPaymentResponse {
        success: tx.public_status() != "failed",
        transaction_id: tx.id,
        status: tx.public_status(),
        provider_reference: tx.provider_reference.clone(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Current view of one transaction. A transaction awaiting confirmation is
/// polled against its provider first, so the response reflects anything the
/// webhook has not delivered yet.
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.processor.poll_status(id).await?;
    Ok(Json(PaymentView::from(tx)))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.processor.cancel(id).await?;
    Ok(Json(PaymentView::from(tx)))
}
