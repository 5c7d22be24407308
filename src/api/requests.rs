use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::gateway_error;
use super::extract::{AdminRequest, admin_json};
use super::{ApiError, ApiResponse, AppState, AppointmentDto, LimitQuery};
use crate::constants::limits;
use crate::db::NewAppointmentRequest;
use crate::services::{Mutation, RequestStatus, actions};

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    pub contact: String,
    pub preferred_times: String,
    pub service: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub id: i32,
    pub message: String,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

/// POST /requests
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<ApiResponse<SubmitResponse>>, ApiError> {
    let saved = state
        .shared
        .appointments
        .submit(NewAppointmentRequest {
            name: payload.name,
            contact: payload.contact,
            preferred_times: payload.preferred_times,
            service: payload.service,
            note: payload.note,
        })
        .await?;

    Ok(Json(ApiResponse::success(SubmitResponse {
        id: saved.id,
        message: "Thanks! We'll contact you soon to confirm your appointment.".to_string(),
    })))
}

/// GET /admin/requests
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Query(query): Query<LimitQuery>,
) -> Result<Response, ApiError> {
    let claims = state.shared.gateway.authorize(&req).await?;

    let limit = query.limit.unwrap_or(limits::RECENT_REQUESTS).min(500);
    let requests: Vec<AppointmentDto> = state
        .shared
        .appointments
        .list_recent(limit)
        .await?
        .into_iter()
        .map(AppointmentDto::from)
        .collect();

    Ok(admin_json(&state, &claims, requests))
}

/// POST /admin/requests/{id}/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Path(id): Path<i32>,
    Json(payload): Json<StatusUpdate>,
) -> Result<Response, ApiError> {
    let appointments = Arc::clone(&state.shared.appointments);

    let (status, claims) = state
        .shared
        .gateway
        .execute(&req, actions::STATUS_UPDATE, |claims| async move {
            let status: RequestStatus = payload.status.parse().map_err(gateway_error)?;
            appointments
                .set_status(id, status)
                .await
                .map_err(gateway_error)?;
            Ok(Mutation::new(
                (status, claims),
                format!("Request #{id} -> {}", status.as_str()),
            ))
        })
        .await?;

    Ok(admin_json(&state, &claims, status))
}

/// POST /admin/requests/{id}/approve
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let appointments = Arc::clone(&state.shared.appointments);

    let claims = state
        .shared
        .gateway
        .execute(&req, actions::REQUEST_APPROVED, |claims| async move {
            appointments
                .set_status(id, RequestStatus::Approved)
                .await
                .map_err(gateway_error)?;
            Ok(Mutation::new(claims, format!("Request #{id}")))
        })
        .await?;

    Ok(admin_json(&state, &claims, RequestStatus::Approved))
}

/// POST /admin/requests/{id}/delete
pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let appointments = Arc::clone(&state.shared.appointments);

    let (deleted, claims) = state
        .shared
        .gateway
        .execute(&req, actions::REQUEST_DELETED, |claims| async move {
            let deleted = appointments.delete(id).await.map_err(gateway_error)?;
            let details = format!("Request #{id} ({})", deleted.name);
            Ok(Mutation::new((deleted, claims), details))
        })
        .await?;

    Ok(admin_json(&state, &claims, AppointmentDto::from(deleted)))
}
