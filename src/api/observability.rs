use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{Instrument, Span, info, info_span};
use uuid::Uuid;

const RESET_PATH_MARKER: &str = "/reset-password/";

/// Request path safe for logs: the reset token segment is masked.
#[must_use]
pub fn redacted_path(path: &str) -> Cow<'_, str> {
    match path.find(RESET_PATH_MARKER) {
        Some(idx) => {
            let start = idx + RESET_PATH_MARKER.len();
            let rest = &path[start..];
            let tail = rest.find('/').map_or("", |end| &rest[end..]);
            Cow::Owned(format!("{}[redacted]{tail}", &path[..start]))
        }
        None => Cow::Borrowed(path),
    }
}

/// Span for `TraceLayer`, built from the redacted path.
pub fn make_trace_span(req: &Request) -> Span {
    tracing::debug_span!(
        "http",
        method = %req.method(),
        path = %redacted_path(req.uri().path()),
        version = ?req.version(),
    )
}

/// Request span plus one wide "request finished" event per request.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = redacted_path(req.uri().path()).into_owned();

    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string());

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
        route = matched_path.clone(),
        user_id = tracing::field::Empty,
    );

    async move {
        let response = next.run(req).await;

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();

        let outcome = if status >= 500 {
            "error"
        } else if status >= 400 {
            "client_error"
        } else {
            "success"
        };

        // Route template, not the raw path: reset tokens must not become labels.
        let metrics_path = matched_path.as_deref().unwrap_or("unmatched");

        let labels = [
            ("method", method.clone()),
            ("path", metrics_path.to_string()),
            ("status", status.to_string()),
        ];

        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        info!(
            event = "http_request_finished",
            duration_ms = duration_ms,
            status_code = status,
            user_agent = %user_agent,
            outcome = %outcome,
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}
