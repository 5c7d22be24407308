use axum::{Json, extract::State};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::NewPatientForm;

/// POST /new-patients
pub async fn submit_new_patient(
    State(state): State<Arc<AppState>>,
    Json(form): Json<NewPatientForm>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.shared.intake.submit(&form).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Thank you! Your new patient form has been received.",
    ))))
}
