//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Upper bound on admin token lifetime
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub notes: NotesConfig,
    pub auth: AuthConfig,
    pub access_log: AccessLogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; "*" allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the SQLite file holding the access log
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "data/analytics.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotesConfig {
    /// Root directory every served note must live under
    pub dir: PathBuf,
    /// Lowercase extensions, including the leading dot
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: u64,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("notes"),
            allowed_extensions: vec![".md".to_string(), ".markdown".to_string()],
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_password: String,
    pub jwt_secret: String,
    /// Admin token lifetime (default: 30 days)
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password: "admin".to_string(),
            jwt_secret: "change-me-in-production".to_string(),
            token_ttl_hours: 24 * 30,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_password", &"[REDACTED]")
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Bounded queue between the request path and the database writer
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            batch_size: 100,
            flush_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";

        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("MDNOTES").separator("__"))
            // Plain variable names kept for existing deployments
            .set_override_option("notes.dir", std::env::var("NOTES_DIR").ok())?
            .set_override_option("auth.admin_password", std::env::var("ADMIN_PASSWORD").ok())?
            .set_override_option("auth.jwt_secret", std::env::var("JWT_SECRET_KEY").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?;

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }
        for origin in &self.server.cors_origins {
            if origin != "*" && origin.parse::<axum::http::HeaderValue>().is_err() {
                anyhow::bail!("Invalid CORS origin '{}'", origin);
            }
        }

        // Validate database config
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }

        // Validate notes config
        if self.notes.allowed_extensions.is_empty() {
            anyhow::bail!("At least one allowed note extension is required");
        }
        if let Some(ext) = self.notes.allowed_extensions.iter().find(|e| !e.starts_with('.') || e.len() < 2) {
            anyhow::bail!("Invalid note extension '{}'. Extensions must look like '.md'", ext);
        }
        if self.notes.max_upload_bytes == 0 {
            anyhow::bail!("notes.max_upload_bytes must be greater than 0");
        }

        // Validate auth config
        if self.auth.admin_password.is_empty() {
            anyhow::bail!("Admin password cannot be empty");
        }
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("JWT secret cannot be empty");
        }
        if self.auth.token_ttl_hours <= 0 || self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            anyhow::bail!(
                "auth.token_ttl_hours must be between 1 and {} (10 years)",
                MAX_TOKEN_TTL_HOURS
            );
        }

        // Validate access log writer
        if self.access_log.queue_capacity == 0 || self.access_log.batch_size == 0 {
            anyhow::bail!("access_log.queue_capacity and access_log.batch_size must be at least 1");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    pub fn cors_allows_any(&self) -> bool {
        self.server.cors_origins.iter().any(|o| o == "*")
    }
}
