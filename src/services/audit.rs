//! Append-only record of security relevant admin events.

use serde::Serialize;

use crate::db::{AuditEntry, Store};

/// Action names written to the audit log.
pub mod actions {
    pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
    pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
    pub const LOGIN_RATE_LIMITED: &str = "LOGIN_RATE_LIMITED";
    pub const LOGOUT: &str = "LOGOUT";
    pub const PASSWORD_RESET_REQUESTED: &str = "PASSWORD_RESET_REQUESTED";
    pub const PASSWORD_RESET_EMAIL_FAILED: &str = "PASSWORD_RESET_EMAIL_FAILED";
    pub const PASSWORD_RESET_SUCCESS: &str = "PASSWORD_RESET_SUCCESS";
    pub const PASSWORD_RESET_FAILED: &str = "PASSWORD_RESET_FAILED";
    pub const PASSWORD_CHANGED: &str = "PASSWORD_CHANGED";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const STATUS_UPDATE: &str = "STATUS_UPDATE";
    pub const REQUEST_APPROVED: &str = "REQUEST_APPROVED";
    pub const REQUEST_DELETED: &str = "REQUEST_DELETED";
    pub const REVIEW_ACCEPTED: &str = "REVIEW_ACCEPTED";
    pub const REVIEW_REJECTED: &str = "REVIEW_REJECTED";
    pub const REVIEW_IMAGE_UPLOADED: &str = "REVIEW_IMAGE_UPLOADED";
    pub const REVIEW_IMAGE_DELETED: &str = "REVIEW_IMAGE_DELETED";
}

/// Who made the request, as far as the server can tell.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    #[must_use]
    pub fn new(ip: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent,
        }
    }

    /// Key used for per-client rate limiting.
    #[must_use]
    pub fn rate_key(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    store: Store,
}

impl AuditLogger {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Writes one entry. A failed write is logged and swallowed so auditing
    /// never changes the outcome of the request being audited.
    pub async fn record(&self, action: &str, details: Option<&str>, meta: &ClientMeta) {
        let result = self
            .store
            .audit_log()
            .append(
                action,
                details,
                meta.ip.as_deref(),
                meta.user_agent.as_deref(),
            )
            .await;

        if let Err(e) = result {
            tracing::error!(action, error = %e, "Failed to write audit log entry");
        }
    }

    /// Newest first.
    pub async fn recent(&self, limit: u64) -> anyhow::Result<Vec<AuditEntry>> {
        self.store.audit_log().recent(limit).await
    }
}
