use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{Config, RateLimitBackend, RatePolicyConfig};
use crate::db::Store;
use crate::services::{
    AdminGateway, AppointmentService, AuditLogger, ChatService, CounterStore, CredentialStore,
    DatabaseCounterStore, EmailSender, IntakeService, LogEmailSender, MemoryCounterStore,
    PasswordResetService, RateLimiter, RatePolicy, ReviewImageStore, ReviewService,
    SeaOrmCredentialStore, SessionManager, SmtpEmailSender,
};

/// Mail delivery as configured: SMTP when enabled, otherwise log only.
pub fn build_email_sender(config: &Config) -> anyhow::Result<Arc<dyn EmailSender>> {
    if config.mail.enabled {
        info!(host = %config.mail.smtp_host, "SMTP delivery enabled");
        Ok(Arc::new(SmtpEmailSender::new(&config.mail)?))
    } else {
        warn!("Mail delivery disabled, outgoing emails will only be logged");
        Ok(Arc::new(LogEmailSender))
    }
}

/// Every long-lived service, built once at startup.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub credentials: Arc<dyn CredentialStore>,

    pub sessions: Arc<SessionManager>,

    pub audit: AuditLogger,

    pub login_limiter: Arc<RateLimiter>,

    pub reset_limiter: Arc<RateLimiter>,

    pub chat_limiter: Arc<RateLimiter>,

    pub admin_limiter: Arc<RateLimiter>,

    pub gateway: Arc<AdminGateway>,

    pub password_reset: Arc<PasswordResetService>,

    pub appointments: Arc<AppointmentService>,

    pub reviews: Arc<ReviewService>,

    pub review_images: Arc<ReviewImageStore>,

    pub chat: Arc<ChatService>,

    pub intake: Arc<IntakeService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer = build_email_sender(&config)?;
        Self::with_mailer(config, mailer).await
    }

    pub async fn with_mailer(config: Config, mailer: Arc<dyn EmailSender>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let config = Arc::new(config);
        let security = &config.security;

        let credentials: Arc<dyn CredentialStore> =
            Arc::new(SeaOrmCredentialStore::new(store.clone(), security.clone())?);
        seed_admin(&config, credentials.as_ref()).await?;

        let counters: Arc<dyn CounterStore> = match security.rate_limit_backend {
            RateLimitBackend::Memory => Arc::new(MemoryCounterStore::new()),
            RateLimitBackend::Database => Arc::new(DatabaseCounterStore::new(store.clone())),
        };
        let limiter = |name: &'static str, policy: &RatePolicyConfig| {
            Arc::new(RateLimiter::new(
                RatePolicy::from_config(name, policy),
                Arc::clone(&counters),
            ))
        };
        let login_limiter = limiter("login", &security.login_limit);
        let reset_limiter = limiter("reset", &security.reset_limit);
        let chat_limiter = limiter("chat", &security.chat_limit);
        let admin_limiter = limiter("admin", &security.admin_action_limit);

        let sessions = Arc::new(SessionManager::new(store.clone(), security)?);
        let audit = AuditLogger::new(store.clone());

        let gateway = Arc::new(AdminGateway::new(
            Arc::clone(&sessions),
            Arc::clone(&admin_limiter),
            audit.clone(),
            security.session.refresh_on_activity,
        ));

        let password_reset = Arc::new(PasswordResetService::new(
            store.clone(),
            Arc::clone(&credentials),
            Arc::clone(&mailer),
            audit.clone(),
            &config,
        ));

        let appointments = Arc::new(AppointmentService::new(
            store.clone(),
            Arc::clone(&mailer),
            config.admin.email.clone(),
            config.clinic.office_name.clone(),
            Duration::from_secs(config.mail.timeout_seconds),
        ));

        let reviews = Arc::new(ReviewService::new(store.clone()));
        let review_images = Arc::new(ReviewImageStore::new(
            &config.reviews.upload_dir,
            config.reviews.max_upload_mb,
        ));

        let intake = Arc::new(IntakeService::new(&config.intake.output_dir));

        let chat = Arc::new(ChatService::new(
            config.chatbot.clone(),
            config.clinic.clone(),
        )?);
        if config.chatbot.api_key.is_none() {
            warn!("Chat API key not configured, chatbot will answer from the FAQ");
        }

        Ok(Self {
            config,
            store,
            credentials,
            sessions,
            audit,
            login_limiter,
            reset_limiter,
            chat_limiter,
            admin_limiter,
            gateway,
            password_reset,
            appointments,
            reviews,
            review_images,
            chat,
            intake,
        })
    }

    /// Purges spent reset tokens and stale rate limit counters.
    pub async fn run_maintenance(&self) -> anyhow::Result<()> {
        let tokens = self
            .password_reset
            .purge_expired()
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let mut counters = 0;
        for limiter in [
            &self.login_limiter,
            &self.reset_limiter,
            &self.chat_limiter,
            &self.admin_limiter,
        ] {
            counters += limiter
                .purge_expired()
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        }

        info!(tokens, counters, "Maintenance purge finished");
        Ok(())
    }
}

async fn seed_admin(config: &Config, credentials: &dyn CredentialStore) -> anyhow::Result<()> {
    match (&config.admin.email, &config.admin.password_hash) {
        (Some(email), Some(hash)) => {
            if credentials
                .seed_admin(email, hash)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to seed admin: {e}"))?
            {
                info!(email = %email, "Seeded admin account");
            }
        }
        (Some(_), None) => {
            warn!("ADMIN_EMAIL is set but ADMIN_PASSWORD_HASH is not, admin not seeded");
        }
        _ => {}
    }
    Ok(())
}
