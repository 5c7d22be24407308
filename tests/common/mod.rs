#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use clinic_portal::api::{self, AppState};
use clinic_portal::config::Config;
use clinic_portal::db::repositories::credentials::hash_password;
use clinic_portal::services::MemoryEmailSender;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@clinic.test";
pub const ADMIN_PASSWORD: &str = "correct-horse-battery";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mailer: Arc<MemoryEmailSender>,
    pub upload_dir: PathBuf,
}

/// A logged-in admin.
pub struct Session {
    pub token: String,
    pub csrf: String,
}

pub fn test_config() -> Config {
    let mut config = Config::for_tests();
    config.admin.email = Some(ADMIN_EMAIL.to_string());
    config.admin.password_hash =
        Some(hash_password(ADMIN_PASSWORD, &config.security).unwrap());
    config.clinic.phone = "555-0100".to_string();
    config.clinic.insurance = "We accept most PPO plans.".to_string();
    config.reviews.upload_dir = std::env::temp_dir()
        .join(format!("clinic-portal-it-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    config.intake.output_dir = std::env::temp_dir()
        .join(format!("clinic-portal-intake-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let upload_dir = PathBuf::from(&config.reviews.upload_dir);
    let mailer = Arc::new(MemoryEmailSender::new());

    let state = api::create_app_state_with_mailer(config, mailer.clone(), None)
        .await
        .expect("Failed to create app state");

    TestApp {
        router: api::router(state.clone()),
        state,
        mailer,
        upload_dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, session: Option<&Session>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(s) = session {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", s.token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST as an admin, with bearer token and CSRF header.
    pub async fn admin_post(&self, uri: &str, session: &Session, body: Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", session.token))
                .header("x-csrf-token", &session.csrf)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn login_with(&self, email: &str, password: &str) -> Response<Body> {
        self.post_json(
            "/api/admin/login",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self) -> Session {
        let response = self.login_with(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        session_from(response).await
    }

    /// Audit actions, newest first.
    pub async fn audit_actions(&self) -> Vec<String> {
        self.state
            .shared
            .audit
            .recent(500)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    /// Waits for background email delivery.
    pub async fn wait_for_mail(&self, count: usize) {
        for _ in 0..100 {
            if self.mailer.sent().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} email(s), got {}", self.mailer.sent().len());
    }
}

pub async fn session_from(response: Response<Body>) -> Session {
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap()
        .to_string();
    let token = cookie
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, v)| v.to_string())
        .unwrap();

    let body = json_body(response).await;
    Session {
        token,
        csrf: body["data"]["csrf_token"].as_str().unwrap().to_string(),
    }
}

pub async fn json_body(response: Response<Body>) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
