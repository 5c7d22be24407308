use axum::{
    extract::{Query, State},
    response::Response,
};
use std::sync::Arc;

use super::extract::{AdminRequest, admin_json};
use super::{ApiError, AppState, AuditEntryDto, LimitQuery};
use crate::constants::limits;

/// GET /admin/audit
/// Newest entries first.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Query(query): Query<LimitQuery>,
) -> Result<Response, ApiError> {
    let claims = state.shared.gateway.authorize(&req).await?;

    let limit = query
        .limit
        .unwrap_or(limits::AUDIT_PAGE_SIZE)
        .clamp(1, limits::AUDIT_PAGE_SIZE * 5);
    let entries: Vec<AuditEntryDto> = state
        .shared
        .audit
        .recent(limit)
        .await?
        .into_iter()
        .map(AuditEntryDto::from)
        .collect();

    Ok(admin_json(&state, &claims, entries))
}
