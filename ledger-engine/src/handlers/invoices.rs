//! Invoice creation and lifecycle.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateInvoiceRequest, SendInvoiceQuery};
use crate::models::{Invoice, InvoiceBalance};
use crate::startup::AppState;

#[tracing::instrument(skip(state, request), fields(org_id = %org_id))]
pub async fn create_invoice(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    request.validate()?;

    let invoice = state.engine.create_invoice(org_id, request.into()).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.engine.get_invoice(org_id, invoice_id).await?))
}

pub async fn send_invoice(
    State(state): State<AppState>,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<SendInvoiceQuery>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .engine
        .send_invoice(org_id, invoice_id, query.issue_date)
        .await?;
    Ok(Json(invoice))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.engine.cancel_invoice(org_id, invoice_id).await?))
}

pub async fn invoice_balance(
    State(state): State<AppState>,
    Path((org_id, invoice_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InvoiceBalance>, AppError> {
    Ok(Json(state.engine.invoice_balance(org_id, invoice_id).await?))
}
