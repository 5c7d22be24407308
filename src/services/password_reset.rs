//! Single-use, time-limited password reset links.
//!
//! Only the SHA-256 of a token is stored. The raw token exists in the emailed
//! link and nowhere else.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::constants::limits;
use crate::db::Store;
use crate::db::repositories::reset_tokens::TokenState;
use crate::db::RedeemOutcome;
use crate::services::audit::{AuditLogger, ClientMeta, actions};
use crate::services::credential_store::{CredentialError, CredentialStore};
use crate::services::email::{
    EmailSender, password_changed_email, password_reset_email, send_with_timeout,
};

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("Reset token not found")]
    TokenNotFound,

    #[error("Reset token expired")]
    TokenExpired,

    #[error("Reset token already used")]
    TokenAlreadyUsed,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResetError {
    /// True for every error caused by the link itself rather than the input.
    #[must_use]
    pub const fn is_token_error(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFound | Self::TokenExpired | Self::TokenAlreadyUsed
        )
    }
}

impl From<anyhow::Error> for ResetError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CredentialError> for ResetError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Validation(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct PasswordResetService {
    store: Store,
    credentials: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailSender>,
    audit: AuditLogger,
    ttl: Duration,
    public_base_url: String,
    clinic_name: String,
    mail_timeout: StdDuration,
}

impl PasswordResetService {
    #[must_use]
    pub fn new(
        store: Store,
        credentials: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailSender>,
        audit: AuditLogger,
        config: &Config,
    ) -> Self {
        Self {
            store,
            credentials,
            mailer,
            audit,
            ttl: Duration::minutes(config.security.reset_token_ttl_minutes),
            public_base_url: config.server.public_base_url.trim_end_matches('/').to_string(),
            clinic_name: config.clinic.office_name.clone(),
            mail_timeout: StdDuration::from_secs(config.mail.timeout_seconds),
        }
    }

    /// Starts a reset for `email`. The caller gets the same result whether or
    /// not the email belongs to an admin, and delivery failures are never
    /// reported back.
    pub fn request_reset(&self, email: &str, meta: &ClientMeta) {
        drop(self.dispatch_reset(email, meta, Utc::now()));
    }

    /// Like [`Self::request_reset`] but hands back the background task. The
    /// admin lookup, token insert and delivery all run inside it, so the
    /// caller returns equally fast for known and unknown emails.
    pub fn dispatch_reset(
        &self,
        email: &str,
        meta: &ClientMeta,
        now: DateTime<Utc>,
    ) -> JoinHandle<()> {
        let service = self.clone();
        let email = email.to_string();
        let meta = meta.clone();

        tokio::spawn(async move { service.deliver_reset(&email, &meta, now).await })
    }

    async fn deliver_reset(&self, email: &str, meta: &ClientMeta, now: DateTime<Utc>) {
        let token = match self.issue_token_at(email, now).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("Password reset requested for unknown email");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create password reset token");
                return;
            }
        };

        let to = crate::db::repositories::credentials::normalize_email(email);
        let message = password_reset_email(
            &to,
            &self.clinic_name,
            &self.reset_url(&token),
            self.ttl.num_minutes(),
        );

        let details = format!("Email: {to}");
        match send_with_timeout(self.mailer.as_ref(), &message, self.mail_timeout).await {
            Ok(()) => {
                self.audit
                    .record(actions::PASSWORD_RESET_REQUESTED, Some(&details), meta)
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send password reset email");
                self.audit
                    .record(actions::PASSWORD_RESET_EMAIL_FAILED, Some(&details), meta)
                    .await;
            }
        }
    }

    /// Creates and stores a token for a known admin email. Returns the raw
    /// token, or `None` when the email is unknown.
    pub async fn issue_token_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, ResetError> {
        let Some(admin) = self.store.credentials().get_by_email(email).await? else {
            return Ok(None);
        };

        let token = hex::encode(rand::random::<[u8; limits::RESET_TOKEN_BYTES]>());
        let expires_at = (now + self.ttl).timestamp();

        self.store
            .reset_tokens()
            .insert(&admin.email, &hash_token(&token), expires_at)
            .await?;

        Ok(Some(token))
    }

    /// Email address a still-valid token belongs to.
    pub async fn inspect(&self, token: &str) -> Result<String, ResetError> {
        self.inspect_at(token, Utc::now()).await
    }

    pub async fn inspect_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, ResetError> {
        match self
            .store
            .reset_tokens()
            .state(&hash_token(token), now.timestamp())
            .await?
        {
            TokenState::Valid { email } => Ok(email),
            TokenState::NotFound => Err(ResetError::TokenNotFound),
            TokenState::AlreadyUsed => Err(ResetError::TokenAlreadyUsed),
            TokenState::Expired => Err(ResetError::TokenExpired),
        }
    }

    pub async fn confirm_reset(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
        meta: &ClientMeta,
    ) -> Result<(), ResetError> {
        self.confirm_reset_at(token, new_password, confirm_password, meta, Utc::now())
            .await
    }

    /// Spends `token` and sets the new password. Token consumption and the
    /// credential update commit together or not at all.
    pub async fn confirm_reset_at(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
        meta: &ClientMeta,
        now: DateTime<Utc>,
    ) -> Result<(), ResetError> {
        if let Err(e) = self.inspect_at(token, now).await {
            self.record_failure(&e, meta).await;
            return Err(e);
        }

        if new_password != confirm_password {
            return Err(ResetError::Validation("Passwords do not match".to_string()));
        }
        let new_hash = self.credentials.hash_new_password(new_password).await?;

        let outcome = self
            .store
            .reset_tokens()
            .redeem(&hash_token(token), &new_hash, now.timestamp())
            .await?;

        let email = match outcome {
            RedeemOutcome::Redeemed { email } => email,
            RedeemOutcome::NotFound => return self.fail(ResetError::TokenNotFound, meta).await,
            RedeemOutcome::AlreadyUsed => {
                return self.fail(ResetError::TokenAlreadyUsed, meta).await;
            }
            RedeemOutcome::Expired => return self.fail(ResetError::TokenExpired, meta).await,
        };

        self.audit
            .record(
                actions::PASSWORD_RESET_SUCCESS,
                Some(&format!("Email: {email}")),
                meta,
            )
            .await;

        let mailer = Arc::clone(&self.mailer);
        let message = password_changed_email(&email, &self.clinic_name);
        let limit = self.mail_timeout;
        tokio::spawn(async move {
            if let Err(e) = send_with_timeout(mailer.as_ref(), &message, limit).await {
                tracing::warn!(error = %e, "Failed to send password changed notification");
            }
        });

        Ok(())
    }

    /// Deletes expired and used tokens.
    pub async fn purge_expired(&self) -> Result<u64, ResetError> {
        Ok(self
            .store
            .reset_tokens()
            .purge(Utc::now().timestamp())
            .await?)
    }

    fn reset_url(&self, token: &str) -> String {
        format!("{}/admin/reset-password/{token}", self.public_base_url)
    }

    async fn fail(&self, err: ResetError, meta: &ClientMeta) -> Result<(), ResetError> {
        self.record_failure(&err, meta).await;
        Err(err)
    }

    async fn record_failure(&self, err: &ResetError, meta: &ClientMeta) {
        self.audit
            .record(
                actions::PASSWORD_RESET_FAILED,
                Some(&format!("Reason: {err}")),
                meta,
            )
            .await;
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::credentials::hash_password;
    use crate::services::SeaOrmCredentialStore;
    use crate::services::email::{EmailError, MemoryEmailSender, OutgoingEmail};

    struct FailingSender;

    #[async_trait::async_trait]
    impl EmailSender for FailingSender {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), EmailError> {
            Err(EmailError::Transport("connection refused".to_string()))
        }
    }

    struct Fixture {
        service: PasswordResetService,
        credentials: Arc<dyn CredentialStore>,
        store: Store,
        audit: AuditLogger,
    }

    async fn setup(mailer: Arc<dyn EmailSender>) -> Fixture {
        let config = Config::for_tests();
        let store = Store::new("sqlite::memory:").await.unwrap();
        let credentials: Arc<dyn CredentialStore> = Arc::new(
            SeaOrmCredentialStore::new(store.clone(), config.security.clone()).unwrap(),
        );
        let hash = hash_password("initial-pass", &config.security).unwrap();
        credentials.seed_admin("admin@clinic.test", &hash).await.unwrap();

        let audit = AuditLogger::new(store.clone());
        let service = PasswordResetService::new(
            store.clone(),
            Arc::clone(&credentials),
            mailer,
            audit.clone(),
            &config,
        );

        Fixture {
            service,
            credentials,
            store,
            audit,
        }
    }

    async fn actions_logged(audit: &AuditLogger) -> Vec<String> {
        audit
            .recent(50)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_email_creates_nothing() {
        let mailer = Arc::new(MemoryEmailSender::new());
        let fx = setup(mailer.clone()).await;

        fx.service
            .dispatch_reset("nobody@clinic.test", &ClientMeta::default(), Utc::now())
            .await
            .unwrap();

        assert!(mailer.sent().is_empty());
        assert_eq!(fx.store.reset_tokens().purge(i64::MAX).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_known_email_sends_link() {
        let mailer = Arc::new(MemoryEmailSender::new());
        let fx = setup(mailer.clone()).await;

        fx.service
            .dispatch_reset("Admin@Clinic.test", &ClientMeta::default(), Utc::now())
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "admin@clinic.test");
        assert!(sent[0].html_body.contains("/admin/reset-password/"));
        assert!(actions_logged(&fx.audit).await.contains(&actions::PASSWORD_RESET_REQUESTED.to_string()));
    }

    #[tokio::test]
    async fn test_lookup_runs_in_background_for_any_email() {
        let mailer = Arc::new(MemoryEmailSender::new());
        let fx = setup(mailer.clone()).await;
        let meta = ClientMeta::default();

        let known = fx.service.dispatch_reset("admin@clinic.test", &meta, Utc::now());
        let unknown = fx.service.dispatch_reset("nobody@clinic.test", &meta, Utc::now());

        // Single-threaded runtime: neither task has been polled yet.
        assert!(!known.is_finished());
        assert!(!unknown.is_finished());
        assert!(mailer.sent().is_empty());

        known.await.unwrap();
        unknown.await.unwrap();
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_email_failure_is_audited_not_returned() {
        let fx = setup(Arc::new(FailingSender)).await;

        fx.service
            .dispatch_reset("admin@clinic.test", &ClientMeta::default(), Utc::now())
            .await
            .unwrap();

        let logged = actions_logged(&fx.audit).await;
        assert!(logged.contains(&actions::PASSWORD_RESET_EMAIL_FAILED.to_string()));
        assert!(!logged.contains(&actions::PASSWORD_RESET_REQUESTED.to_string()));
    }

    #[tokio::test]
    async fn test_token_is_single_use() {
        let fx = setup(Arc::new(MemoryEmailSender::new())).await;
        let meta = ClientMeta::default();
        let token = fx
            .service
            .issue_token_at("admin@clinic.test", Utc::now())
            .await
            .unwrap()
            .unwrap();

        fx.service
            .confirm_reset(&token, "brand-new-pass", "brand-new-pass", &meta)
            .await
            .unwrap();
        assert!(fx.credentials.verify("admin@clinic.test", "brand-new-pass").await.unwrap());

        let again = fx
            .service
            .confirm_reset(&token, "another-pass-1", "another-pass-1", &meta)
            .await;
        assert!(matches!(again, Err(ResetError::TokenAlreadyUsed)));
        assert!(fx.credentials.verify("admin@clinic.test", "brand-new-pass").await.unwrap());
    }

    #[tokio::test]
    async fn test_token_expires_after_ttl() {
        let fx = setup(Arc::new(MemoryEmailSender::new())).await;
        let issued_at = Utc::now();
        let token = fx
            .service
            .issue_token_at("admin@clinic.test", issued_at)
            .await
            .unwrap()
            .unwrap();

        let late = issued_at + Duration::minutes(61);
        let result = fx
            .service
            .confirm_reset_at(&token, "brand-new-pass", "brand-new-pass", &ClientMeta::default(), late)
            .await;

        assert!(matches!(result, Err(ResetError::TokenExpired)));
        assert!(fx.credentials.verify("admin@clinic.test", "initial-pass").await.unwrap());
        assert!(actions_logged(&fx.audit).await.contains(&actions::PASSWORD_RESET_FAILED.to_string()));
    }

    #[tokio::test]
    async fn test_validation_leaves_token_unused() {
        let fx = setup(Arc::new(MemoryEmailSender::new())).await;
        let meta = ClientMeta::default();
        let token = fx
            .service
            .issue_token_at("admin@clinic.test", Utc::now())
            .await
            .unwrap()
            .unwrap();

        let short = fx.service.confirm_reset(&token, "short", "short", &meta).await;
        assert!(matches!(short, Err(ResetError::Validation(_))));

        let mismatch = fx
            .service
            .confirm_reset(&token, "long-enough-1", "long-enough-2", &meta)
            .await;
        assert!(matches!(mismatch, Err(ResetError::Validation(_))));

        assert_eq!(fx.service.inspect(&token).await.unwrap(), "admin@clinic.test");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let fx = setup(Arc::new(MemoryEmailSender::new())).await;
        let result = fx.service.inspect("deadbeef").await;
        assert!(matches!(result, Err(ResetError::TokenNotFound)));
    }

    #[tokio::test]
    async fn test_concurrent_redemption_succeeds_once() {
        let fx = setup(Arc::new(MemoryEmailSender::new())).await;
        let token = fx
            .service
            .issue_token_at("admin@clinic.test", Utc::now())
            .await
            .unwrap()
            .unwrap();
        let meta = ClientMeta::default();

        let (a, b) = tokio::join!(
            fx.service.confirm_reset(&token, "first-password", "first-password", &meta),
            fx.service.confirm_reset(&token, "second-password", "second-password", &meta),
        );

        assert_eq!(u8::from(a.is_ok()) + u8::from(b.is_ok()), 1);
    }

    #[tokio::test]
    async fn test_reset_invalidates_sessions() {
        let fx = setup(Arc::new(MemoryEmailSender::new())).await;
        let before = fx.store.credentials().get_by_email("admin@clinic.test").await.unwrap().unwrap();
        let token = fx
            .service
            .issue_token_at("admin@clinic.test", Utc::now())
            .await
            .unwrap()
            .unwrap();

        fx.service
            .confirm_reset(&token, "brand-new-pass", "brand-new-pass", &ClientMeta::default())
            .await
            .unwrap();

        let after = fx.store.credentials().get_by_email("admin@clinic.test").await.unwrap().unwrap();
        assert_eq!(after.session_epoch, before.session_epoch + 1);
    }
}
