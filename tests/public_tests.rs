mod common;

use axum::http::{StatusCode, header};
use common::{json_body, spawn_app, spawn_app_with, test_config};
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;

    let response = app.get("/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_metrics_disabled() {
    let app = spawn_app().await;
    let response = app.get("/api/metrics", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_appointment_request_validation() {
    let app = spawn_app().await;

    let response = app
        .post_json(
            "/api/requests",
            json!({
                "name": "  ",
                "contact": "555-0100",
                "preferred_times": "Any",
                "service": "Cleaning",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_review_rating_out_of_range() {
    let app = spawn_app().await;

    let response = app
        .post_json(
            "/api/reviews",
            json!({ "author": "Sam", "body": "Fine", "rating": 9 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_answers_from_faq_without_api() {
    let app = spawn_app().await;

    let response = app
        .post_json("/api/chat", json!({ "message": "Do you take insurance?" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["source"], "faq");
    assert_eq!(body["data"]["reply"], "We accept most PPO plans.");
}

#[tokio::test]
async fn test_chat_emergency() {
    let app = spawn_app().await;

    let response = app
        .post_json("/api/chat", json!({ "message": "I have trouble breathing" }))
        .await;
    let body = json_body(response).await;
    assert_eq!(body["data"]["source"], "emergency");
}

#[tokio::test]
async fn test_chat_is_rate_limited() {
    let mut config = test_config();
    config.security.chat_limit.max_requests = 2;
    let app = spawn_app_with(config).await;

    for _ in 0..2 {
        let response = app.post_json("/api/chat", json!({ "message": "" })).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.post_json("/api/chat", json!({ "message": "" })).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_forgot_password_is_rate_limited() {
    let app = spawn_app().await;

    for _ in 0..5 {
        let response = app
            .post_json(
                "/api/admin/forgot-password",
                json!({ "email": "nobody@clinic.test" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .post_json(
            "/api/admin/forgot-password",
            json!({ "email": "nobody@clinic.test" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_new_patient_form_is_stored() {
    let app = spawn_app().await;
    let output_dir = std::path::PathBuf::from(&app.state.config().intake.output_dir);

    let response = app
        .post_json(
            "/api/new-patients",
            json!({
                "p_first": "Jane",
                "p_last": "Doe",
                "p_sex": "Female",
                "m_conditions": ["diabetes"],
                "sig_med": "Jane Doe",
                "agree": true,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let files: Vec<_> = std::fs::read_dir(&output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("Doe_Jane_"));

    let stored: serde_json::Value =
        serde_json::from_slice(&std::fs::read(output_dir.join(&files[0])).unwrap()).unwrap();
    assert_eq!(stored["fields"]["sex"], "2");
    assert_eq!(stored["fields"]["diabetes"], "Yes");

    let _ = std::fs::remove_dir_all(&output_dir);
}

#[tokio::test]
async fn test_new_patient_form_requires_agreement() {
    let app = spawn_app().await;

    let response = app
        .post_json(
            "/api/new-patients",
            json!({ "p_first": "Jane", "p_last": "Doe", "sig_med": "Jane Doe" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "You must agree to the policy to submit.");
    assert!(!std::path::Path::new(&app.state.config().intake.output_dir).exists());
}
