use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::extract::{
    AdminRequest, ClientInfo, admin_json, clear_session_cookie, session_cookie, with_cookie,
};
use super::{AdminDto, ApiError, ApiResponse, AppState, MessageResponse, SessionDto};
use crate::constants::messages;
use crate::db::AdminCredential;
use crate::services::{
    CredentialError, Decision, GatewayError, IssuedSession, Mutation, SessionClaims, actions,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Serialize)]
pub struct ResetLinkResponse {
    pub email: String,
}

fn admin_dto(admin: AdminCredential) -> AdminDto {
    AdminDto {
        id: admin.id,
        email: admin.email,
        created_at: admin.created_at,
        updated_at: admin.updated_at,
    }
}

fn session_response(state: &AppState, admin: AdminCredential, issued: &IssuedSession) -> Response {
    let max_age = state.shared.sessions.ttl().num_seconds();
    let body = Json(ApiResponse::success(SessionDto {
        admin: admin_dto(admin),
        csrf_token: issued.csrf_token.clone(),
        expires_at: issued.expires_at,
    }));
    with_cookie(
        body.into_response(),
        &session_cookie(state.config(), issued, max_age),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /admin/login
/// Rate limited per client IP. A successful login clears the counter.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientInfo(meta): ClientInfo,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let shared = &state.shared;
    let rate_key = meta.rate_key().to_string();

    if let Decision::Limited { retry_after_secs } =
        shared.login_limiter.check_and_record(&rate_key).await?
    {
        shared
            .audit
            .record(
                actions::LOGIN_RATE_LIMITED,
                Some(&format!("Email: {}", payload.email.trim())),
                &meta,
            )
            .await;
        metrics::counter!("auth_login_total", "outcome" => "rate_limited").increment(1);
        return Err(ApiError::TooManyRequests { retry_after_secs });
    }

    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Email and password are required"));
    }

    let admin = match shared
        .credentials
        .authenticate(&payload.email, &payload.password)
        .await
    {
        Ok(admin) => admin,
        Err(CredentialError::InvalidCredentials) => {
            shared
                .audit
                .record(
                    actions::LOGIN_FAILED,
                    Some(&format!("Email: {}", payload.email.trim())),
                    &meta,
                )
                .await;
            metrics::counter!("auth_login_total", "outcome" => "failure").increment(1);
            return Err(ApiError::Unauthorized(
                messages::INVALID_CREDENTIALS.to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    shared.login_limiter.reset(&rate_key).await?;
    shared
        .audit
        .record(
            actions::LOGIN_SUCCESS,
            Some(&format!("Email: {}", admin.email)),
            &meta,
        )
        .await;
    metrics::counter!("auth_login_total", "outcome" => "success").increment(1);
    tracing::info!(admin_id = admin.id, "Admin logged in");

    let issued = shared.sessions.issue(&admin);
    Ok(session_response(&state, admin, &issued))
}

/// POST /admin/logout
/// Revokes every session of the admin and clears the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
) -> Result<Response, ApiError> {
    let sessions = Arc::clone(&state.shared.sessions);

    state
        .shared
        .gateway
        .execute(&req, actions::LOGOUT, |claims| async move {
            sessions
                .revoke_all(claims.admin_id)
                .await
                .map_err(|e| GatewayError::Internal(e.to_string()))?;
            Ok(Mutation::new((), format!("Admin #{}", claims.admin_id)))
        })
        .await?;

    let body = Json(ApiResponse::success(MessageResponse::new("Logged out")));
    Ok(with_cookie(
        body.into_response(),
        &clear_session_cookie(state.config()),
    ))
}

/// GET /admin/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
) -> Result<Response, ApiError> {
    let claims = state.shared.gateway.authorize(&req).await?;
    let admin = state.shared.credentials.get(claims.admin_id).await?;

    let csrf_token = state.shared.sessions.csrf_token(&claims);
    let dto = SessionDto {
        admin: admin_dto(admin),
        csrf_token,
        expires_at: claims.expires_at,
    };
    Ok(admin_json(&state, &claims, dto))
}

/// POST /admin/forgot-password
/// The response is identical whether or not the email belongs to an admin.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ClientInfo(meta): ClientInfo,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let shared = &state.shared;

    if let Decision::Limited { retry_after_secs } = shared
        .reset_limiter
        .check_and_record(meta.rate_key())
        .await?
    {
        shared
            .audit
            .record(actions::RATE_LIMITED, Some("Action: forgot-password"), &meta)
            .await;
        return Err(ApiError::TooManyRequests { retry_after_secs });
    }

    if !payload.email.trim().is_empty() {
        shared
            .password_reset
            .request_reset(&payload.email, &meta);
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        messages::RESET_REQUESTED,
    ))))
}

/// GET /admin/reset-password/{token}
pub async fn check_reset_token(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<ResetLinkResponse>>, ApiError> {
    let email = state.shared.password_reset.inspect(&token).await?;
    Ok(Json(ApiResponse::success(ResetLinkResponse { email })))
}

/// POST /admin/reset-password/{token}
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    ClientInfo(meta): ClientInfo,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .shared
        .password_reset
        .confirm_reset(
            &token,
            &payload.new_password,
            &payload.confirm_password,
            &meta,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password reset successfully. You can now log in.",
    ))))
}

/// POST /admin/change-password
/// Every existing session is revoked. The caller gets a fresh one.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response, ApiError> {
    let credentials = Arc::clone(&state.shared.credentials);

    let admin = state
        .shared
        .gateway
        .execute(
            &req,
            actions::PASSWORD_CHANGED,
            |claims: SessionClaims| async move {
                let admin = credentials
                    .get(claims.admin_id)
                    .await
                    .map_err(super::error::gateway_error)?;
                credentials
                    .change_password(
                        &admin.email,
                        &payload.current_password,
                        &payload.new_password,
                        &payload.confirm_password,
                    )
                    .await
                    .map_err(super::error::gateway_error)?;
                let admin = credentials
                    .get(claims.admin_id)
                    .await
                    .map_err(super::error::gateway_error)?;

                let details = format!("Email: {}", admin.email);
                Ok(Mutation::new(admin, details))
            },
        )
        .await?;

    let issued = state.shared.sessions.issue(&admin);
    Ok(session_response(&state, admin, &issued))
}
