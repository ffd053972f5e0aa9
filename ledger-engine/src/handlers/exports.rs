use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::LedgerExportQuery;
use crate::startup::AppState;

/// Download the ledger file for a period as `text/plain`.
#[tracing::instrument(skip(state, query), fields(org_id = %org_id))]
pub async fn ledger_export(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<LedgerExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let document = state
        .engine
        .generate_ledger_export(org_id, query.start_date, query.end_date, &query.tax_id)
        .await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
        ],
        document.content,
    ))
}
