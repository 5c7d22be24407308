use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::constants::{env, limits};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub admin: AdminConfig,

    pub mail: MailConfig,

    pub chatbot: ChatbotConfig,

    pub reviews: ReviewsConfig,

    pub intake: IntakeConfig,

    pub clinic: ClinicInfo,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Emit logs as JSON lines instead of the human readable format.
    pub json_logs: bool,

    /// Number of tokio worker threads. 0 uses the number of CPU cores.
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,

    /// Cron expression for the expired token / stale counter purge.
    pub maintenance_cron: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/clinic.db".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
            maintenance_cron: "0 */15 * * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    /// Externally visible base URL, used to build password reset links.
    pub public_base_url: String,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the session cookie.
    /// Default: true. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Trust the left-most `X-Forwarded-For` entry as the client address.
    /// Only enable behind a reverse proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            public_base_url: "http://localhost:5000".to_string(),
            cors_allowed_origins: vec!["http://localhost:5000".to_string()],
            secure_cookies: true,
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Counters live in process memory and reset on restart.
    Memory,
    /// Counters live in the `rate_limit_counters` table and survive restarts.
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC key for session and CSRF tokens. Must be at least 32 bytes.
    /// Usually supplied through `CLINIC_SECRET_KEY`.
    #[serde(skip_serializing)]
    pub secret_key: String,

    /// Argon2 memory cost in KiB
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    pub min_password_length: usize,

    /// Lifetime of a password reset link in minutes.
    pub reset_token_ttl_minutes: i64,

    pub session: SessionConfig,

    pub rate_limit_backend: RateLimitBackend,

    pub login_limit: RatePolicyConfig,

    pub reset_limit: RatePolicyConfig,

    pub chat_limit: RatePolicyConfig,

    pub admin_action_limit: RatePolicyConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            argon2_memory_cost_kib: 19 * 1024,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
            min_password_length: 8,
            reset_token_ttl_minutes: 60,
            session: SessionConfig::default(),
            rate_limit_backend: RateLimitBackend::Memory,
            login_limit: RatePolicyConfig {
                max_requests: 5,
                window_seconds: 15 * 60,
            },
            reset_limit: RatePolicyConfig {
                max_requests: 5,
                window_seconds: 15 * 60,
            },
            chat_limit: RatePolicyConfig {
                max_requests: 20,
                window_seconds: 60,
            },
            admin_action_limit: RatePolicyConfig {
                max_requests: 60,
                window_seconds: 60,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: i64,

    /// Re-issue the session token with a fresh expiry on each admin request.
    pub refresh_on_activity: bool,

    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            refresh_on_activity: false,
            cookie_name: "admin_session".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatePolicyConfig {
    pub max_requests: u32,

    pub window_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Seed admin email. Usually supplied through `ADMIN_EMAIL`.
    pub email: Option<String>,

    /// Argon2 PHC string for the seed admin. Generate with `clinic-portal hash-password`.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,

    pub smtp_host: String,

    pub smtp_port: u16,

    /// STARTTLS on the submission port. When false an implicit TLS relay is used.
    pub starttls: bool,

    pub username: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,

    pub from_address: String,

    /// Upper bound for a single send, connection included.
    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            starttls: true,
            username: None,
            password: None,
            from_address: "no-reply@localhost".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatbotConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// OpenAI compatible chat completions endpoint.
    pub api_url: String,

    pub model: String,

    pub temperature: f32,

    pub max_tokens: u32,

    pub timeout_seconds: u64,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_tokens: 400,
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewsConfig {
    pub upload_dir: String,

    pub max_upload_mb: usize,
}

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self {
            upload_dir: "static/uploads/reviews".to_string(),
            max_upload_mb: 8,
        }
    }
}

/// Where completed new-patient intake forms are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub output_dir: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            output_dir: "data/new_patients".to_string(),
        }
    }
}

/// Operator supplied clinic facts. The chatbot builds its prompt and its
/// fallback answers from these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicInfo {
    pub office_name: String,

    pub address: String,

    pub phone: String,

    pub email: String,

    pub insurance: String,

    /// Ordered (day, hours) pairs.
    pub hours: Vec<(String, String)>,

    pub services: Vec<String>,
}

impl Default for ClinicInfo {
    fn default() -> Self {
        Self {
            office_name: "Clinic".to_string(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            insurance: String::new(),
            hours: Vec::new(),
            services: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            admin: AdminConfig::default(),
            mail: MailConfig::default(),
            chatbot: ChatbotConfig::default(),
            reviews: ReviewsConfig::default(),
            intake: IntakeConfig::default(),
            clinic: ClinicInfo::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads `.env`, the first config file found, then applies environment overrides.
    pub fn load() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            warn!("Failed to read .env file: {e}");
        }

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overlays secrets and deployment settings from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(env::SECRET_KEY) {
            self.security.secret_key = v;
        }
        if let Some(v) = non_empty(env::ADMIN_EMAIL) {
            self.admin.email = Some(v);
        }
        if let Some(v) = non_empty(env::ADMIN_PASSWORD_HASH) {
            self.admin.password_hash = Some(v);
        }
        if let Some(v) = non_empty(env::SMTP_PASSWORD) {
            self.mail.password = Some(v);
        }
        if let Some(v) = non_empty(env::CHAT_API_KEY) {
            self.chatbot.api_key = Some(v);
        }
        if let Some(v) = non_empty(env::DATABASE_URL) {
            self.general.database_path = v;
        }
        if let Some(port) = non_empty(env::PORT).and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("clinic-portal").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".clinic-portal").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.secret_key.len() < limits::MIN_SECRET_KEY_BYTES {
            anyhow::bail!(
                "Secret key must be at least {} bytes (set {})",
                limits::MIN_SECRET_KEY_BYTES,
                env::SECRET_KEY
            );
        }

        if self.security.session.ttl_hours <= 0 {
            anyhow::bail!("Session TTL must be > 0 hours");
        }

        if self.security.reset_token_ttl_minutes <= 0 {
            anyhow::bail!("Reset token TTL must be > 0 minutes");
        }

        if self.security.min_password_length < limits::MIN_PASSWORD_LENGTH {
            anyhow::bail!(
                "Minimum password length cannot be lower than {}",
                limits::MIN_PASSWORD_LENGTH
            );
        }

        for (name, policy) in [
            ("login_limit", &self.security.login_limit),
            ("reset_limit", &self.security.reset_limit),
            ("chat_limit", &self.security.chat_limit),
            ("admin_action_limit", &self.security.admin_action_limit),
        ] {
            if policy.max_requests == 0 || policy.window_seconds == 0 {
                anyhow::bail!("security.{name} needs max_requests > 0 and window_seconds > 0");
            }
        }

        url::Url::parse(&self.server.public_base_url).context("Invalid server.public_base_url")?;

        if self.mail.enabled && self.mail.smtp_host.is_empty() {
            anyhow::bail!("SMTP host cannot be empty when mail is enabled");
        }

        if self.observability.loki_enabled {
            url::Url::parse(&self.observability.loki_url).context("Invalid Loki URL")?;
        }

        Ok(())
    }

    /// A configuration suitable for tests: in-memory database, cheap hashing.
    #[must_use]
    pub fn for_tests() -> Self {
        let mut config = Self::default();
        config.general.database_path = "sqlite::memory:".to_string();
        config.general.max_db_connections = 1;
        config.security.secret_key = "test-secret-key-that-is-long-enough-0123456789".to_string();
        config.security.argon2_memory_cost_kib = 1024;
        config.security.argon2_time_cost = 1;
        config.server.secure_cookies = false;
        config.observability.metrics_enabled = false;
        config
    }
}
