//! Payment recording and reversal.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::RecordPaymentRequest;
use crate::models::{InvoiceBalance, Payment};
use crate::services::PaymentReceipt;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request), fields(org_id = %org_id, invoice_id = %invoice_id))]
pub async fn record_payment(
    State(state): State<AppState>,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentReceipt>), AppError> {
    request.validate()?;

    let receipt = state
        .engine
        .record_payment(org_id, request.into_record(invoice_id))
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.engine.list_payments(org_id, invoice_id).await?))
}

/// Reverse a payment; responds with the invoice balance afterwards.
#[tracing::instrument(skip(state), fields(org_id = %org_id, payment_id = %payment_id))]
pub async fn reverse_payment(
    State(state): State<AppState>,
    Path((org_id, payment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InvoiceBalance>, AppError> {
    Ok(Json(state.engine.reverse_payment(org_id, payment_id).await?))
}
