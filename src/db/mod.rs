use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use crate::entities::admin_audit_log::Model as AuditEntry;
pub use repositories::appointments::{AppointmentRequest, NewAppointmentRequest};
pub use repositories::credentials::AdminCredential;
pub use repositories::reset_tokens::RedeemOutcome;
pub use repositories::reviews::{NewReview, Review};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        if in_memory {
            // Every pooled connection would otherwise see its own empty database.
            opt.max_connections(1).min_connections(1);
        } else {
            opt.max_connections(max_connections)
                .min_connections(min_connections)
                .idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn credentials(&self) -> repositories::credentials::CredentialRepository {
        repositories::credentials::CredentialRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn reset_tokens(&self) -> repositories::reset_tokens::ResetTokenRepository {
        repositories::reset_tokens::ResetTokenRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn audit_log(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn appointments(&self) -> repositories::appointments::AppointmentRepository {
        repositories::appointments::AppointmentRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn reviews(&self) -> repositories::reviews::ReviewRepository {
        repositories::reviews::ReviewRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn rate_limits(&self) -> repositories::rate_limits::RateLimitRepository {
        repositories::rate_limits::RateLimitRepository::new(self.conn.clone())
    }
}
