use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::CreateOrganizationRequest;
use crate::models::Organization;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn create_organization(
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    request.validate()?;

    let org = state.engine.create_organization(request.into()).await?;
    Ok((StatusCode::CREATED, Json(org)))
}
