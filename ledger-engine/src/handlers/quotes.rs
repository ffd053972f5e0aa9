//! Quote creation, lifecycle and conversion.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ConvertQuoteQuery, CreateQuoteRequest};
use crate::models::{Quote, QuoteAction};
use crate::services::Conversion;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request), fields(org_id = %org_id))]
pub async fn create_quote(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(request): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<Quote>), AppError> {
    request.validate()?;

    let quote = state.engine.create_quote(org_id, request.into()).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

pub async fn get_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    Ok(Json(state.engine.get_quote(org_id, quote_id).await?))
}

async fn transition(
    state: AppState,
    org_id: Uuid,
    quote_id: Uuid,
    action: QuoteAction,
) -> Result<Json<Quote>, AppError> {
    let quote = state
        .engine
        .transition_quote(org_id, quote_id, action)
        .await?;
    Ok(Json(quote))
}

pub async fn send_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    transition(state, org_id, quote_id, QuoteAction::Send).await
}

pub async fn accept_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    transition(state, org_id, quote_id, QuoteAction::Accept).await
}

pub async fn sign_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    transition(state, org_id, quote_id, QuoteAction::Sign).await
}

pub async fn reject_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    transition(state, org_id, quote_id, QuoteAction::Reject).await
}

pub async fn expire_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Quote>, AppError> {
    transition(state, org_id, quote_id, QuoteAction::Expire).await
}

/// `201 Created` for a new invoice, `200 OK` when the quote was already converted.
#[tracing::instrument(skip(state, query), fields(org_id = %org_id, quote_id = %quote_id))]
pub async fn convert_quote(
    State(state): State<AppState>,
    Path((org_id, quote_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ConvertQuoteQuery>,
) -> Result<(StatusCode, Json<Conversion>), AppError> {
    query.validate()?;

    let conversion = state
        .engine
        .convert_quote_to_invoice(org_id, quote_id, query.payment_terms_days)
        .await?;

    let status = if conversion.is_new() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversion)))
}
