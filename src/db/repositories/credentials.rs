use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, sea_query::Expr,
};

use crate::config::SecurityConfig;
use crate::entities::admin_credentials;

/// Admin row without the password hash.
#[derive(Debug, Clone)]
pub struct AdminCredential {
    pub id: i32,
    pub email: String,
    pub session_epoch: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<admin_credentials::Model> for AdminCredential {
    fn from(model: admin_credentials::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            session_epoch: model.session_epoch,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct CredentialRepository {
    conn: DatabaseConnection,
}

impl CredentialRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<AdminCredential>> {
        let admin = admin_credentials::Entity::find()
            .filter(admin_credentials::Column::Email.eq(normalize_email(email)))
            .one(&self.conn)
            .await
            .context("Failed to query admin by email")?;

        Ok(admin.map(AdminCredential::from))
    }

    /// Admin row together with its password hash, for verification only.
    pub async fn get_with_hash(&self, email: &str) -> Result<Option<(AdminCredential, String)>> {
        let admin = admin_credentials::Entity::find()
            .filter(admin_credentials::Column::Email.eq(normalize_email(email)))
            .one(&self.conn)
            .await
            .context("Failed to query admin for password verification")?;

        Ok(admin.map(|a| {
            let password_hash = a.password_hash.clone();
            (AdminCredential::from(a), password_hash)
        }))
    }

    pub async fn get_by_id(&self, id: i32) -> Result<Option<AdminCredential>> {
        let admin = admin_credentials::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query admin by ID")?;

        Ok(admin.map(AdminCredential::from))
    }

    /// Inserts the admin if the email is not taken yet. Returns whether a row was created.
    pub async fn insert_if_missing(&self, email: &str, password_hash: &str) -> Result<bool> {
        if self.get_by_email(email).await?.is_some() {
            return Ok(false);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let active = admin_credentials::ActiveModel {
            email: Set(normalize_email(email)),
            password_hash: Set(password_hash.to_string()),
            session_epoch: Set(0),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        active
            .insert(&self.conn)
            .await
            .context("Failed to insert admin credential")?;

        Ok(true)
    }

    /// Replaces the password hash and bumps the session epoch.
    pub async fn update_password_hash(&self, email: &str, password_hash: &str) -> Result<bool> {
        update_password_hash_on(&self.conn, email, password_hash).await
    }

    /// Bumps the session epoch, invalidating every outstanding session for this admin.
    pub async fn bump_session_epoch(&self, id: i32) -> Result<()> {
        admin_credentials::Entity::update_many()
            .col_expr(
                admin_credentials::Column::SessionEpoch,
                Expr::col(admin_credentials::Column::SessionEpoch).add(1),
            )
            .filter(admin_credentials::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to bump session epoch")?;

        Ok(())
    }
}

/// Password update usable inside a caller-owned transaction.
pub async fn update_password_hash_on<C: ConnectionTrait>(
    conn: &C,
    email: &str,
    password_hash: &str,
) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();

    let result = admin_credentials::Entity::update_many()
        .col_expr(
            admin_credentials::Column::PasswordHash,
            Expr::value(password_hash.to_string()),
        )
        .col_expr(admin_credentials::Column::UpdatedAt, Expr::value(now))
        .col_expr(
            admin_credentials::Column::SessionEpoch,
            Expr::col(admin_credentials::Column::SessionEpoch).add(1),
        )
        .filter(admin_credentials::Column::Email.eq(normalize_email(email)))
        .exec(conn)
        .await
        .context("Failed to update admin password")?;

    Ok(result.rows_affected == 1)
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Hash a password using Argon2id with the configured params.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2_for(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verify a password against a PHC string. Params are read from the hash itself.
pub fn verify_password_hash(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn argon2_for(config: &SecurityConfig) -> Result<Argon2<'static>> {
    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}
