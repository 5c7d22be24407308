//! Request extractors for client details and admin credentials.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use serde::Serialize;

use super::{ApiResponse, AppState};
use crate::config::Config;
use crate::constants::headers;
use crate::services::{ClientMeta, GatewayRequest, IssuedSession, SessionClaims};

/// Client IP and user agent of the current request.
pub struct ClientInfo(pub ClientMeta);

impl FromRequestParts<Arc<AppState>> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(client_meta(parts, state.config())))
    }
}

/// Everything the admin gateway needs from a request.
pub struct AdminRequest(pub GatewayRequest);

impl FromRequestParts<Arc<AppState>> for AdminRequest {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let config = state.config();
        let session_token = session_token(&parts.headers, &config.security.session.cookie_name);
        let csrf_token = parts
            .headers
            .get(headers::CSRF_TOKEN)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(token) = &session_token {
            // Only the admin id part, never the whole token.
            if let Some(admin_id) = token.split('.').nth(1) {
                tracing::Span::current().record("user_id", admin_id);
            }
        }

        Ok(Self(GatewayRequest {
            session_token,
            csrf_token,
            meta: client_meta(parts, config),
        }))
    }
}

fn client_meta(parts: &Parts, config: &Config) -> ClientMeta {
    let forwarded = if config.server.trust_forwarded_for {
        parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
    } else {
        None
    };

    let ip = forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    ClientMeta { ip, user_agent }
}

/// Session token from the session cookie, falling back to
/// `Authorization: Bearer`.
fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name)
        && !cookie.value().is_empty()
    {
        return Some(cookie.value().to_string());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

pub fn session_cookie(config: &Config, session: &IssuedSession, max_age_secs: i64) -> String {
    let secure = if config.server.secure_cookies {
        "; Secure"
    } else {
        ""
    };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        config.security.session.cookie_name, session.token, max_age_secs, secure
    )
}

pub fn clear_session_cookie(config: &Config) -> String {
    let secure = if config.server.secure_cookies {
        "; Secure"
    } else {
        ""
    };
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        config.security.session.cookie_name, secure
    )
}

pub fn with_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "Failed to build session cookie"),
    }
    response
}

/// Success envelope for an admin endpoint. Carries a refreshed session cookie
/// when sliding sessions are enabled.
pub fn admin_json<T: Serialize>(state: &AppState, claims: &SessionClaims, data: T) -> Response {
    let response = Json(ApiResponse::success(data)).into_response();

    match state.shared.gateway.maybe_refresh(claims) {
        Some(fresh) => {
            let max_age = state.shared.sessions.ttl().num_seconds();
            with_cookie(response, &session_cookie(state.config(), &fresh, max_age))
        }
        None => response,
    }
}
