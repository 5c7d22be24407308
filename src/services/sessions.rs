//! Signed, stateless admin sessions.
//!
//! A token is `v1.<admin_id>.<epoch>.<issued_at>.<expires_at>.<nonce>.<mac>`
//! where `mac` is HMAC-SHA256 over everything before the last dot. Nothing is
//! stored server side; revocation works by bumping the admin's session epoch,
//! which every token carries and `validate` compares against the database.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::db::{AdminCredential, Store};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";
const CSRF_CONTEXT: &[u8] = b"csrf";
const NONCE_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session")]
    Invalid,

    #[error("Session store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// What a valid token asserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub admin_id: i32,
    pub epoch: i64,
    pub issued_at: i64,
    pub expires_at: i64,
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub csrf_token: String,
    pub expires_at: i64,
}

pub struct SessionManager {
    mac: HmacSha256,
    ttl: Duration,
    store: Store,
}

impl SessionManager {
    pub fn new(store: Store, security: &SecurityConfig) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(security.secret_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid session signing key: {e}"))?;

        Ok(Self {
            mac,
            ttl: Duration::hours(security.session.ttl_hours),
            store,
        })
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn issue(&self, admin: &AdminCredential) -> IssuedSession {
        self.issue_at(admin, Utc::now())
    }

    #[must_use]
    pub fn issue_at(&self, admin: &AdminCredential, now: DateTime<Utc>) -> IssuedSession {
        let nonce = hex::encode(rand::random::<[u8; NONCE_BYTES]>());
        let claims = SessionClaims {
            admin_id: admin.id,
            epoch: admin.session_epoch,
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
            nonce,
        };
        self.sign(&claims)
    }

    /// Re-issues `claims` with a fresh expiry. Epoch and nonce are kept, so the
    /// CSRF token stays the same and revocation still applies.
    #[must_use]
    pub fn refresh_at(&self, claims: &SessionClaims, now: DateTime<Utc>) -> IssuedSession {
        let refreshed = SessionClaims {
            issued_at: now.timestamp(),
            expires_at: (now + self.ttl).timestamp(),
            ..claims.clone()
        };
        self.sign(&refreshed)
    }

    pub async fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.validate_at(token, Utc::now()).await
    }

    /// Checks signature, expiry and epoch. Every rejection is the same
    /// [`SessionError::Invalid`]; the reason only goes to debug logs.
    pub async fn validate_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, SessionError> {
        let Some(claims) = self.decode(token) else {
            tracing::debug!("Rejected malformed or forged session token");
            return Err(SessionError::Invalid);
        };

        if now.timestamp() >= claims.expires_at {
            tracing::debug!(admin_id = claims.admin_id, "Rejected expired session");
            return Err(SessionError::Invalid);
        }

        let Some(admin) = self.store.credentials().get_by_id(claims.admin_id).await? else {
            tracing::debug!(admin_id = claims.admin_id, "Session refers to unknown admin");
            return Err(SessionError::Invalid);
        };

        if admin.session_epoch != claims.epoch {
            tracing::debug!(admin_id = claims.admin_id, "Rejected revoked session");
            return Err(SessionError::Invalid);
        }

        Ok(claims)
    }

    /// Invalidates every outstanding session for the admin.
    pub async fn revoke_all(&self, admin_id: i32) -> Result<(), SessionError> {
        self.store.credentials().bump_session_epoch(admin_id).await?;
        Ok(())
    }

    #[must_use]
    pub fn csrf_token(&self, claims: &SessionClaims) -> String {
        hex::encode(self.csrf_mac(&claims.nonce).finalize().into_bytes())
    }

    #[must_use]
    pub fn verify_csrf(&self, claims: &SessionClaims, presented: &str) -> bool {
        let Ok(bytes) = hex::decode(presented.trim()) else {
            return false;
        };
        self.csrf_mac(&claims.nonce).verify_slice(&bytes).is_ok()
    }

    fn csrf_mac(&self, nonce: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(CSRF_CONTEXT);
        mac.update(nonce.as_bytes());
        mac
    }

    fn sign(&self, claims: &SessionClaims) -> IssuedSession {
        let payload = format!(
            "{TOKEN_VERSION}.{}.{}.{}.{}.{}",
            claims.admin_id, claims.epoch, claims.issued_at, claims.expires_at, claims.nonce
        );

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        IssuedSession {
            token: format!("{payload}.{signature}"),
            csrf_token: self.csrf_token(claims),
            expires_at: claims.expires_at,
        }
    }

    fn decode(&self, token: &str) -> Option<SessionClaims> {
        let (payload, signature) = token.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let parts: Vec<&str> = payload.split('.').collect();
        let [version, admin_id, epoch, issued_at, expires_at, nonce] = parts.as_slice() else {
            return None;
        };
        if *version != TOKEN_VERSION || nonce.is_empty() {
            return None;
        }

        Some(SessionClaims {
            admin_id: admin_id.parse().ok()?,
            epoch: epoch.parse().ok()?,
            issued_at: issued_at.parse().ok()?,
            expires_at: expires_at.parse().ok()?,
            nonce: (*nonce).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::repositories::credentials::hash_password;

    async fn setup() -> (SessionManager, Store, AdminCredential) {
        let config = Config::for_tests();
        let store = Store::new("sqlite::memory:").await.unwrap();
        let hash = hash_password("initial-pass", &config.security).unwrap();
        store
            .credentials()
            .insert_if_missing("admin@clinic.test", &hash)
            .await
            .unwrap();
        let admin = store
            .credentials()
            .get_by_email("admin@clinic.test")
            .await
            .unwrap()
            .unwrap();

        let sessions = SessionManager::new(store.clone(), &config.security).unwrap();
        (sessions, store, admin)
    }

    #[tokio::test]
    async fn test_issue_then_validate() {
        let (sessions, _, admin) = setup().await;
        let issued = sessions.issue(&admin);

        let claims = sessions.validate(&issued.token).await.unwrap();
        assert_eq!(claims.admin_id, admin.id);
        assert_eq!(claims.epoch, admin.session_epoch);
        assert!(issued.token.starts_with("v1."));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let (sessions, _, admin) = setup().await;
        let now = Utc::now();
        let issued = sessions.issue_at(&admin, now);

        let just_before = now + Duration::hours(24) - Duration::seconds(1);
        assert!(sessions.validate_at(&issued.token, just_before).await.is_ok());

        let at_expiry = now + Duration::hours(24);
        assert!(matches!(
            sessions.validate_at(&issued.token, at_expiry).await,
            Err(SessionError::Invalid)
        ));
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let (sessions, _, admin) = setup().await;
        let issued = sessions.issue(&admin);

        let forged = issued.token.replacen(&format!("v1.{}.", admin.id), "v1.999.", 1);
        assert!(sessions.validate(&forged).await.is_err());

        let mut truncated = issued.token.clone();
        truncated.pop();
        assert!(sessions.validate(&truncated).await.is_err());

        assert!(sessions.validate("").await.is_err());
        assert!(sessions.validate("v1.1.0.0.0.abc").await.is_err());
    }

    #[tokio::test]
    async fn test_other_key_rejected() {
        let (sessions, store, admin) = setup().await;
        let mut other = Config::for_tests().security;
        other.secret_key = "another-secret-key-that-is-long-enough-xyz".to_string();
        let foreign = SessionManager::new(store, &other).unwrap();

        let issued = foreign.issue(&admin);
        assert!(sessions.validate(&issued.token).await.is_err());
    }

    #[tokio::test]
    async fn test_revoke_all_invalidates_existing() {
        let (sessions, _, admin) = setup().await;
        let first = sessions.issue(&admin);
        let second = sessions.issue(&admin);

        sessions.revoke_all(admin.id).await.unwrap();

        assert!(sessions.validate(&first.token).await.is_err());
        assert!(sessions.validate(&second.token).await.is_err());
    }

    #[tokio::test]
    async fn test_password_change_invalidates_sessions() {
        let (sessions, store, admin) = setup().await;
        let issued = sessions.issue(&admin);

        store
            .credentials()
            .update_password_hash("admin@clinic.test", "$argon2id$placeholder")
            .await
            .unwrap();

        assert!(sessions.validate(&issued.token).await.is_err());
    }

    #[tokio::test]
    async fn test_csrf_bound_to_session() {
        let (sessions, _, admin) = setup().await;
        let a = sessions.issue(&admin);
        let b = sessions.issue(&admin);
        let claims_a = sessions.validate(&a.token).await.unwrap();

        assert!(sessions.verify_csrf(&claims_a, &a.csrf_token));
        assert!(!sessions.verify_csrf(&claims_a, &b.csrf_token));
        assert!(!sessions.verify_csrf(&claims_a, "not-hex"));
        assert!(!sessions.verify_csrf(&claims_a, ""));
    }

    #[tokio::test]
    async fn test_refresh_extends_and_keeps_csrf() {
        let (sessions, _, admin) = setup().await;
        let now = Utc::now();
        let issued = sessions.issue_at(&admin, now);
        let claims = sessions.validate_at(&issued.token, now).await.unwrap();

        let later = now + Duration::hours(20);
        let refreshed = sessions.refresh_at(&claims, later);

        assert!(refreshed.expires_at > issued.expires_at);
        assert_eq!(refreshed.csrf_token, issued.csrf_token);
        assert!(
            sessions
                .validate_at(&refreshed.token, later + Duration::hours(10))
                .await
                .is_ok()
        );
    }
}
