//! Domain service for the admin credential.
//!
//! Owns password verification and replacement. Callers never see the stored
//! hash, and a failed verification looks the same whether the email is unknown
//! or the password is wrong.

use thiserror::Error;

use crate::db::AdminCredential;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Admin not found")]
    NotFound,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for CredentialError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CredentialError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Password hashing task failed: {err}"))
    }
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Checks `password` against the stored hash for `email`.
    ///
    /// Always performs exactly one Argon2 verification so timing does not
    /// reveal whether the email exists.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidCredentials`] on any mismatch.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AdminCredential, CredentialError>;

    /// Boolean form of [`CredentialStore::authenticate`].
    async fn verify(&self, email: &str, password: &str) -> Result<bool, CredentialError> {
        match self.authenticate(email, password).await {
            Ok(_) => Ok(true),
            Err(CredentialError::InvalidCredentials) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replaces the password and bumps the session epoch.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Validation`] when the password is too short
    /// and [`CredentialError::NotFound`] when no admin has this email.
    async fn set_password(&self, email: &str, new_password: &str) -> Result<(), CredentialError>;

    /// Validates and hashes a new password without storing it.
    async fn hash_new_password(&self, new_password: &str) -> Result<String, CredentialError>;

    /// Changes the password of a logged-in admin.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Validation`] when the current password is
    /// wrong, the confirmation differs, or the new password is too short or
    /// unchanged.
    async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), CredentialError>;

    /// Creates the admin row from a pre-computed hash if it does not exist yet.
    async fn seed_admin(&self, email: &str, password_hash: &str) -> Result<bool, CredentialError>;

    async fn get(&self, admin_id: i32) -> Result<AdminCredential, CredentialError>;
}
