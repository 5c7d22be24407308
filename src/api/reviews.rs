use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::gateway_error;
use super::extract::{AdminRequest, admin_json};
use super::{ApiError, ApiResponse, AppState, ReviewDto};
use crate::db::NewReview;
use crate::services::{ModerationDecision, Mutation, actions};

#[derive(Deserialize)]
pub struct SubmitReview {
    pub author: String,
    pub body: String,
    pub rating: i32,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ModerateRequest {
    pub decision: ModerationDecision,
}

#[derive(Serialize)]
pub struct ImageDto {
    pub name: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::validation(err.body_text())
    }
}

/// GET /reviews
pub async fn list_approved(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ReviewDto>>>, ApiError> {
    let reviews = state
        .shared
        .reviews
        .list_approved()
        .await?
        .into_iter()
        .map(ReviewDto::from)
        .collect();

    Ok(Json(ApiResponse::success(reviews)))
}

/// POST /reviews
/// New reviews stay hidden until moderated.
pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitReview>,
) -> Result<Json<ApiResponse<ReviewDto>>, ApiError> {
    let review = state
        .shared
        .reviews
        .submit(NewReview {
            author: payload.author,
            body: payload.body,
            rating: payload.rating,
        })
        .await?;

    Ok(Json(ApiResponse::success(ReviewDto::from(review))))
}

/// GET /reviews/images
pub async fn list_images(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    let images = state.shared.review_images.list().await?;
    Ok(Json(ApiResponse::success(images)))
}

/// GET /admin/reviews
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    let claims = state.shared.gateway.authorize(&req).await?;

    let reviews: Vec<ReviewDto> = state
        .shared
        .reviews
        .list_all(query.status.as_deref())
        .await?
        .into_iter()
        .map(ReviewDto::from)
        .collect();

    Ok(admin_json(&state, &claims, reviews))
}

/// POST /admin/reviews/{id}/moderate
pub async fn moderate(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Path(id): Path<i32>,
    Json(payload): Json<ModerateRequest>,
) -> Result<Response, ApiError> {
    let reviews = Arc::clone(&state.shared.reviews);
    let action = match payload.decision {
        ModerationDecision::Accept => actions::REVIEW_ACCEPTED,
        ModerationDecision::Reject => actions::REVIEW_REJECTED,
    };

    let (review, claims) = state
        .shared
        .gateway
        .execute(&req, action, |claims| async move {
            let review = reviews
                .moderate(id, payload.decision)
                .await
                .map_err(gateway_error)?;
            let details = format!("Review #{id} by {}", review.author);
            Ok(Mutation::new((review, claims), details))
        })
        .await?;

    Ok(admin_json(&state, &claims, ReviewDto::from(review)))
}

/// POST /admin/reviews/images
/// Multipart upload, file in the `image` field.
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    state
        .shared
        .gateway
        .admit(&req, actions::REVIEW_IMAGE_UPLOADED)
        .await?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::validation("No file selected"));
    };

    let images = Arc::clone(&state.shared.review_images);
    let (name, claims) = state
        .shared
        .gateway
        .execute(&req, actions::REVIEW_IMAGE_UPLOADED, |claims| async move {
            let name = images
                .save(&file_name, &bytes)
                .await
                .map_err(gateway_error)?;
            let details = format!("File: {name}");
            Ok(Mutation::new((name, claims), details))
        })
        .await?;

    Ok(admin_json(&state, &claims, ImageDto { name }))
}

/// POST /admin/reviews/images/{name}/delete
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    AdminRequest(req): AdminRequest,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let images = Arc::clone(&state.shared.review_images);

    let (name, claims) = state
        .shared
        .gateway
        .execute(&req, actions::REVIEW_IMAGE_DELETED, |claims| async move {
            let name = images.remove(&name).await.map_err(gateway_error)?;
            let details = format!("File: {name}");
            Ok(Mutation::new((name, claims), details))
        })
        .await?;

    Ok(admin_json(&state, &claims, ImageDto { name }))
}
