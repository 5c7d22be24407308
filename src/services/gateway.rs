//! Single entry point for state-changing admin operations.
//!
//! Every mutation passes the same checks in the same order: session, CSRF,
//! rate limit. Only then does the mutation run, and its outcome is always
//! written to the audit log. A rejected request never reaches the mutation.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::services::audit::{AuditLogger, ClientMeta, actions};
use crate::services::rate_limit::{Decision, RateLimiter};
use crate::services::sessions::{IssuedSession, SessionClaims, SessionError, SessionManager};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Credentials and client details presented with an admin request.
#[derive(Debug, Clone, Default)]
pub struct GatewayRequest {
    pub session_token: Option<String>,
    pub csrf_token: Option<String>,
    pub meta: ClientMeta,
}

/// What a successful mutation returns: its value and a line for the audit log.
#[derive(Debug)]
pub struct Mutation<T> {
    pub value: T,
    pub details: String,
}

impl<T> Mutation<T> {
    pub fn new(value: T, details: impl Into<String>) -> Self {
        Self {
            value,
            details: details.into(),
        }
    }
}

pub struct AdminGateway {
    sessions: Arc<SessionManager>,
    limiter: Arc<RateLimiter>,
    audit: AuditLogger,
    refresh_on_activity: bool,
}

impl AdminGateway {
    #[must_use]
    pub const fn new(
        sessions: Arc<SessionManager>,
        limiter: Arc<RateLimiter>,
        audit: AuditLogger,
        refresh_on_activity: bool,
    ) -> Self {
        Self {
            sessions,
            limiter,
            audit,
            refresh_on_activity,
        }
    }

    /// Session check only, for read-only admin endpoints.
    pub async fn authorize(&self, req: &GatewayRequest) -> Result<SessionClaims, GatewayError> {
        let Some(token) = req.session_token.as_deref() else {
            return Err(GatewayError::Unauthorized);
        };

        match self.sessions.validate(token).await {
            Ok(claims) => Ok(claims),
            Err(SessionError::Invalid) => Err(GatewayError::Unauthorized),
            Err(SessionError::Store(e)) => Err(GatewayError::Internal(e)),
        }
    }

    /// Session and CSRF checks for `action`, audited as `UNAUTHORIZED` on
    /// rejection. Lets handlers refuse before reading a large request body.
    pub async fn admit(
        &self,
        req: &GatewayRequest,
        action: &str,
    ) -> Result<SessionClaims, GatewayError> {
        let claims = match self.authorize(req).await {
            Ok(claims) => claims,
            Err(GatewayError::Unauthorized) => {
                self.reject(action, "missing or invalid session", &req.meta)
                    .await;
                return Err(GatewayError::Unauthorized);
            }
            Err(e) => return Err(e),
        };

        let csrf_ok = req
            .csrf_token
            .as_deref()
            .is_some_and(|presented| self.sessions.verify_csrf(&claims, presented));
        if !csrf_ok {
            self.reject(action, "CSRF check failed", &req.meta).await;
            return Err(GatewayError::Unauthorized);
        }

        Ok(claims)
    }

    /// Runs `mutation` for an authenticated admin.
    ///
    /// Success is audited as `action`, failure as `<action>_FAILED`. Rejections
    /// before the mutation are audited as `UNAUTHORIZED` or `RATE_LIMITED`.
    pub async fn execute<T, F, Fut>(
        &self,
        req: &GatewayRequest,
        action: &str,
        mutation: F,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce(SessionClaims) -> Fut + Send,
        Fut: Future<Output = Result<Mutation<T>, GatewayError>> + Send,
        T: Send,
    {
        let claims = self.admit(req, action).await?;

        let key = format!("admin-{}", claims.admin_id);
        let decision = self
            .limiter
            .check_and_record(&key)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        if let Decision::Limited { retry_after_secs } = decision {
            self.audit
                .record(
                    actions::RATE_LIMITED,
                    Some(&format!("Action: {action}, admin #{}", claims.admin_id)),
                    &req.meta,
                )
                .await;
            return Err(GatewayError::RateLimited { retry_after_secs });
        }

        match mutation(claims).await {
            Ok(done) => {
                self.audit
                    .record(action, Some(&done.details), &req.meta)
                    .await;
                Ok(done.value)
            }
            Err(e) => {
                self.audit
                    .record(&format!("{action}_FAILED"), Some(&e.to_string()), &req.meta)
                    .await;
                Err(e)
            }
        }
    }

    /// A fresh token for `claims` when sliding sessions are enabled.
    #[must_use]
    pub fn maybe_refresh(&self, claims: &SessionClaims) -> Option<IssuedSession> {
        self.refresh_on_activity
            .then(|| self.sessions.refresh_at(claims, Utc::now()))
    }

    async fn reject(&self, action: &str, reason: &str, meta: &ClientMeta) {
        self.audit
            .record(
                actions::UNAUTHORIZED,
                Some(&format!("Action: {action}, {reason}")),
                meta,
            )
            .await;
    }
}
