use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::constants::headers;
use crate::services::EmailSender;
use crate::state::SharedState;

mod audit;
pub mod auth;
mod chat;
mod error;
pub mod extract;
mod intake;
mod observability;
mod requests;
mod reviews;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

/// Multipart framing on top of the image itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub const fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }
}

#[must_use]
pub fn create_app_state(
    shared: SharedState,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = SharedState::new(config).await?;
    Ok(create_app_state(shared, prometheus_handle))
}

/// Same as [`create_app_state_from_config`] with a caller supplied mailer.
pub async fn create_app_state_with_mailer(
    config: Config,
    mailer: Arc<dyn EmailSender>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = SharedState::with_mailer(config, mailer).await?;
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().server.cors_allowed_origins.clone();
    let upload_limit = state.shared.review_images.max_bytes() + UPLOAD_OVERHEAD_BYTES;

    let public_routes = Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::metrics))
        .route("/requests", post(requests::submit_request))
        .route("/new-patients", post(intake::submit_new_patient))
        .route(
            "/reviews",
            get(reviews::list_approved).post(reviews::submit_review),
        )
        .route("/reviews/images", get(reviews::list_images))
        .route("/chat", post(chat::chat));

    let api_router = Router::new()
        .merge(public_routes)
        .nest("/admin", create_admin_router(upload_limit))
        .with_state(state);

    // Credentialed CORS cannot use a wildcard origin.
    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                HeaderName::from_static(headers::CSRF_TOKEN),
            ])
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods([Method::GET, Method::POST]))
        .layer(
            TraceLayer::new_for_http().make_span_with(observability::make_trace_span),
        )
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_admin_router(upload_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/forgot-password", post(auth::forgot_password))
        .route(
            "/reset-password/{token}",
            get(auth::check_reset_token).post(auth::reset_password),
        )
        .route("/change-password", post(auth::change_password))
        .route("/requests", get(requests::list_requests))
        .route("/requests/{id}/status", post(requests::update_status))
        .route("/requests/{id}/approve", post(requests::approve_request))
        .route("/requests/{id}/delete", post(requests::delete_request))
        .route("/reviews", get(reviews::list_all))
        .route("/reviews/{id}/moderate", post(reviews::moderate))
        .route(
            "/reviews/images",
            post(reviews::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/reviews/images/{name}/delete",
            post(reviews::delete_image),
        )
        .route("/audit", get(audit::list_entries))
}
