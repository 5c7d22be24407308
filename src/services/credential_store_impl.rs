//! `SeaORM` implementation of the `CredentialStore` trait.

use async_trait::async_trait;

use crate::config::SecurityConfig;
use crate::db::repositories::credentials::{hash_password, verify_password_hash};
use crate::db::{AdminCredential, Store};
use crate::services::credential_store::{CredentialError, CredentialStore};

pub struct SeaOrmCredentialStore {
    store: Store,
    security: SecurityConfig,
    /// Verified against when the email is unknown, so both paths cost one Argon2 run.
    dummy_hash: String,
}

impl SeaOrmCredentialStore {
    pub fn new(store: Store, security: SecurityConfig) -> anyhow::Result<Self> {
        let filler = hex::encode(rand::random::<[u8; 16]>());
        let dummy_hash = hash_password(&filler, &security)?;

        Ok(Self {
            store,
            security,
            dummy_hash,
        })
    }

    fn validate_new_password(&self, password: &str) -> Result<(), CredentialError> {
        let min = self.security.min_password_length;
        if password.chars().count() < min {
            return Err(CredentialError::Validation(format!(
                "Password must be at least {min} characters"
            )));
        }
        Ok(())
    }
}

async fn verify_blocking(password: &str, hash: &str) -> Result<bool, CredentialError> {
    let password = password.to_string();
    let hash = hash.to_string();

    let matched = tokio::task::spawn_blocking(move || verify_password_hash(&password, &hash))
        .await??;

    Ok(matched)
}

#[async_trait]
impl CredentialStore for SeaOrmCredentialStore {
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AdminCredential, CredentialError> {
        let found = self.store.credentials().get_with_hash(email).await?;

        match found {
            Some((admin, hash)) => {
                // A corrupt stored hash is treated like a wrong password.
                let matched = verify_blocking(password, &hash).await.unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Stored admin password hash is unreadable");
                    false
                });
                if matched {
                    Ok(admin)
                } else {
                    Err(CredentialError::InvalidCredentials)
                }
            }
            None => {
                let _ = verify_blocking(password, &self.dummy_hash).await?;
                Err(CredentialError::InvalidCredentials)
            }
        }
    }

    async fn set_password(&self, email: &str, new_password: &str) -> Result<(), CredentialError> {
        let hash = self.hash_new_password(new_password).await?;

        let updated = self
            .store
            .credentials()
            .update_password_hash(email, &hash)
            .await?;

        if !updated {
            return Err(CredentialError::NotFound);
        }
        Ok(())
    }

    async fn hash_new_password(&self, new_password: &str) -> Result<String, CredentialError> {
        self.validate_new_password(new_password)?;

        let password = new_password.to_string();
        let security = self.security.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password, &security)).await??;

        Ok(hash)
    }

    async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), CredentialError> {
        if new_password != confirm_password {
            return Err(CredentialError::Validation(
                "New passwords do not match".to_string(),
            ));
        }

        if current_password == new_password {
            return Err(CredentialError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        self.validate_new_password(new_password)?;

        match self.authenticate(email, current_password).await {
            Ok(_) => {}
            Err(CredentialError::InvalidCredentials) => {
                return Err(CredentialError::Validation(
                    "Current password is incorrect".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }

        self.set_password(email, new_password).await
    }

    async fn seed_admin(&self, email: &str, password_hash: &str) -> Result<bool, CredentialError> {
        if email.trim().is_empty() {
            return Err(CredentialError::Validation(
                "Admin email cannot be empty".to_string(),
            ));
        }

        if argon2::PasswordHash::new(password_hash).is_err() {
            return Err(CredentialError::Validation(
                "Admin password hash is not a valid PHC string".to_string(),
            ));
        }

        Ok(self
            .store
            .credentials()
            .insert_if_missing(email, password_hash)
            .await?)
    }

    async fn get(&self, admin_id: i32) -> Result<AdminCredential, CredentialError> {
        self.store
            .credentials()
            .get_by_id(admin_id)
            .await?
            .ok_or(CredentialError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    async fn setup() -> SeaOrmCredentialStore {
        let config = Config::for_tests();
        let store = Store::new("sqlite::memory:").await.unwrap();
        let creds = SeaOrmCredentialStore::new(store, config.security.clone()).unwrap();

        let hash = hash_password("initial-pass", &config.security).unwrap();
        assert!(creds.seed_admin("Admin@Clinic.test", &hash).await.unwrap());
        creds
    }

    #[tokio::test]
    async fn test_verify() {
        let creds = setup().await;

        assert!(creds.verify("admin@clinic.test", "initial-pass").await.unwrap());
        assert!(creds.verify(" ADMIN@clinic.test ", "initial-pass").await.unwrap());
        assert!(!creds.verify("admin@clinic.test", "wrong").await.unwrap());
        assert!(!creds.verify("nobody@clinic.test", "initial-pass").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_alike() {
        let creds = setup().await;

        let unknown = creds.authenticate("nobody@clinic.test", "x").await.unwrap_err();
        let wrong = creds.authenticate("admin@clinic.test", "x").await.unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_set_password_bumps_epoch() {
        let creds = setup().await;
        let before = creds.authenticate("admin@clinic.test", "initial-pass").await.unwrap();

        creds.set_password("admin@clinic.test", "second-pass").await.unwrap();

        assert!(!creds.verify("admin@clinic.test", "initial-pass").await.unwrap());
        let after = creds.authenticate("admin@clinic.test", "second-pass").await.unwrap();
        assert_eq!(after.session_epoch, before.session_epoch + 1);
    }

    #[tokio::test]
    async fn test_set_password_rejects_short() {
        let creds = setup().await;

        let err = creds.set_password("admin@clinic.test", "short").await.unwrap_err();
        assert!(matches!(err, CredentialError::Validation(_)));
    }

    #[tokio::test]
    async fn test_set_password_unknown_email() {
        let creds = setup().await;

        let err = creds.set_password("nobody@clinic.test", "long-enough").await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound));
    }

    #[tokio::test]
    async fn test_change_password_checks() {
        let creds = setup().await;
        let email = "admin@clinic.test";

        let mismatch = creds
            .change_password(email, "initial-pass", "new-password", "other-password")
            .await;
        assert!(matches!(mismatch, Err(CredentialError::Validation(_))));

        let same = creds
            .change_password(email, "initial-pass", "initial-pass", "initial-pass")
            .await;
        assert!(matches!(same, Err(CredentialError::Validation(_))));

        let wrong_current = creds
            .change_password(email, "nope", "new-password", "new-password")
            .await;
        assert!(matches!(wrong_current, Err(CredentialError::Validation(_))));

        creds
            .change_password(email, "initial-pass", "new-password", "new-password")
            .await
            .unwrap();
        assert!(creds.verify(email, "new-password").await.unwrap());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent_and_validates_hash() {
        let creds = setup().await;

        assert!(!creds.seed_admin("admin@clinic.test", &creds.dummy_hash).await.unwrap());
        assert!(matches!(
            creds.seed_admin("other@clinic.test", "plaintext").await,
            Err(CredentialError::Validation(_))
        ));
    }
}
