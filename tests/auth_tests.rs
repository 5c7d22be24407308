mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{ADMIN_EMAIL, ADMIN_PASSWORD, json_body, session_from, spawn_app};
use serde_json::json;

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let app = spawn_app().await;

    let response = app.login_with(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("admin_session=v1."));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["admin"]["email"], ADMIN_EMAIL);
    assert!(body["data"]["csrf_token"].is_string());

    assert!(app.audit_actions().await.contains(&"LOGIN_SUCCESS".to_string()));
}

#[tokio::test]
async fn test_me_accepts_cookie_and_bearer() {
    let app = spawn_app().await;
    let session = app.login().await;

    let response = app.get("/api/admin/me", Some(&session)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            Request::builder()
                .uri("/api/admin/me")
                .header(header::COOKIE, format!("admin_session={}", session.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["csrf_token"], session.csrf.as_str());

    let response = app.get("/api/admin/me", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_failures_look_identical() {
    let app = spawn_app().await;

    let wrong_password = app.login_with(ADMIN_EMAIL, "not-the-password").await;
    let unknown_email = app.login_with("nobody@clinic.test", ADMIN_PASSWORD).await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong_password).await, json_body(unknown_email).await);

    let actions = app.audit_actions().await;
    assert_eq!(actions.iter().filter(|a| *a == "LOGIN_FAILED").count(), 2);
}

#[tokio::test]
async fn test_sixth_failed_login_is_rate_limited() {
    let app = spawn_app().await;

    for _ in 0..5 {
        let response = app.login_with(ADMIN_EMAIL, "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.login_with(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 900);

    assert!(
        app.audit_actions()
            .await
            .contains(&"LOGIN_RATE_LIMITED".to_string())
    );
}

#[tokio::test]
async fn test_successful_login_clears_counter() {
    let app = spawn_app().await;

    for _ in 0..4 {
        app.login_with(ADMIN_EMAIL, "wrong-password").await;
    }
    app.login().await;

    for _ in 0..4 {
        let response = app.login_with(ADMIN_EMAIL, "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_forgot_password_same_response_for_unknown_email() {
    let app = spawn_app().await;

    let known = app
        .post_json("/api/admin/forgot-password", json!({ "email": ADMIN_EMAIL }))
        .await;
    let unknown = app
        .post_json(
            "/api/admin/forgot-password",
            json!({ "email": "nobody@clinic.test" }),
        )
        .await;

    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(json_body(known).await, json_body(unknown).await);

    app.wait_for_mail(1).await;
    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, ADMIN_EMAIL);
}

fn token_from_mail(html: &str) -> String {
    let marker = "/admin/reset-password/";
    let start = html.find(marker).unwrap() + marker.len();
    html[start..]
        .chars()
        .take_while(char::is_ascii_hexdigit)
        .collect()
}

#[tokio::test]
async fn test_reset_link_works_once() {
    let app = spawn_app().await;

    app.post_json("/api/admin/forgot-password", json!({ "email": ADMIN_EMAIL }))
        .await;
    app.wait_for_mail(1).await;
    let token = token_from_mail(&app.mailer.sent()[0].html_body);
    assert_eq!(token.len(), 64);

    let uri = format!("/api/admin/reset-password/{token}");
    let response = app.get(&uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["email"], ADMIN_EMAIL);

    let new_password = json!({
        "new_password": "a-brand-new-password",
        "confirm_password": "a-brand-new-password",
    });
    let response = app.post_json(&uri, new_password.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.post_json(&uri, new_password).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Invalid or expired reset link"));

    let response = app.login_with(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = app.login_with(ADMIN_EMAIL, "a-brand-new-password").await;
    assert_eq!(response.status(), StatusCode::OK);

    let actions = app.audit_actions().await;
    assert!(actions.contains(&"PASSWORD_RESET_SUCCESS".to_string()));
    assert!(actions.contains(&"PASSWORD_RESET_FAILED".to_string()));
}

#[tokio::test]
async fn test_unknown_reset_token_rejected() {
    let app = spawn_app().await;
    let uri = format!("/api/admin/reset-password/{}", "ab".repeat(32));

    let response = app.get(&uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_mismatch_keeps_token_usable() {
    let app = spawn_app().await;

    app.post_json("/api/admin/forgot-password", json!({ "email": ADMIN_EMAIL }))
        .await;
    app.wait_for_mail(1).await;
    let token = token_from_mail(&app.mailer.sent()[0].html_body);
    let uri = format!("/api/admin/reset-password/{token}");

    let response = app
        .post_json(
            &uri,
            json!({ "new_password": "first-password-x", "confirm_password": "other-password-x" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get(&uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_change_revokes_old_session() {
    let app = spawn_app().await;
    let old = app.login().await;

    let response = app
        .admin_post(
            "/api/admin/change-password",
            &old,
            json!({
                "current_password": ADMIN_PASSWORD,
                "new_password": "another-strong-password",
                "confirm_password": "another-strong-password",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let fresh = session_from(response).await;

    assert_eq!(
        app.get("/api/admin/me", Some(&old)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        app.get("/api/admin/me", Some(&fresh)).await.status(),
        StatusCode::OK
    );
    assert!(app.audit_actions().await.contains(&"PASSWORD_CHANGED".to_string()));
}

#[tokio::test]
async fn test_change_password_wrong_current_is_audited() {
    let app = spawn_app().await;
    let session = app.login().await;

    let response = app
        .admin_post(
            "/api/admin/change-password",
            &session,
            json!({
                "current_password": "not-my-password",
                "new_password": "another-strong-password",
                "confirm_password": "another-strong-password",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(
        app.get("/api/admin/me", Some(&session)).await.status(),
        StatusCode::OK
    );
    assert!(
        app.audit_actions()
            .await
            .contains(&"PASSWORD_CHANGED_FAILED".to_string())
    );
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let app = spawn_app().await;
    let session = app.login().await;

    let response = app
        .admin_post("/api/admin/logout", &session, json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains("Max-Age=0"));

    assert_eq!(
        app.get("/api/admin/me", Some(&session)).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert!(app.audit_actions().await.contains(&"LOGOUT".to_string()));
}
