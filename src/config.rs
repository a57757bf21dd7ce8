use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    pub security: SecurityConfig,

    pub media: MediaConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 0)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/vidhub.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 0,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on the token cookies.
    /// Default: true. Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Maximum accepted request body size, multipart uploads included.
    pub body_limit_bytes: usize,

    /// Directory served as static files at the site root.
    pub public_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            secure_cookies: true,
            body_limit_bytes: 10 * 1024 * 1024,
            public_path: "public".to_string(),
        }
    }
}

/// Token signing material and lifetimes.
///
/// Expiries accept a bare number of seconds or a number followed by
/// `s`, `m`, `h`, `d` or `w` (`"15m"`, `"10d"`).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    #[serde(skip_serializing)]
    pub access_token_secret: String,

    pub access_token_expiry: String,

    #[serde(skip_serializing)]
    pub refresh_token_secret: String,

    pub refresh_token_expiry: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            access_token_expiry: "1d".to_string(),
            refresh_token_secret: String::new(),
            refresh_token_expiry: "10d".to_string(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token_secret", &"<redacted>")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_secret", &"<redacted>")
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish()
    }
}

impl AuthConfig {
    pub fn access_ttl(&self) -> Result<Duration> {
        parse_expiry(&self.access_token_expiry)
            .with_context(|| format!("Invalid access token expiry: {}", self.access_token_expiry))
    }

    pub fn refresh_ttl(&self) -> Result<Duration> {
        parse_expiry(&self.refresh_token_expiry).with_context(|| {
            format!(
                "Invalid refresh token expiry: {}",
                self.refresh_token_expiry
            )
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Where uploaded avatars and cover images end up.
    pub storage_path: String,

    /// Scratch directory for multipart uploads before they are stored.
    pub temp_path: String,

    /// URL prefix under which `storage_path` is served.
    pub public_base_url: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_path: "data/media".to_string(),
            temp_path: "public/temp".to_string(),
            public_base_url: "/media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            json_logs: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            media: MediaConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Loads the first config file found, then layers `.env` and process
    /// environment variables on top.
    pub fn load() -> Result<Self> {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
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

    /// Overrides file settings with the environment variables the service
    /// has always been deployed with.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ACCESS_TOKEN_SECRET") {
            self.auth.access_token_secret = v;
        }
        if let Some(v) = lookup("ACCESS_TOKEN_EXPIRY") {
            self.auth.access_token_expiry = v;
        }
        if let Some(v) = lookup("REFRESH_TOKEN_SECRET") {
            self.auth.refresh_token_secret = v;
        }
        if let Some(v) = lookup("REFRESH_TOKEN_EXPIRY") {
            self.auth.refresh_token_expiry = v;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.general.database_path = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = v
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {v}"))?;
        }
        if let Some(v) = lookup("CORS_ORIGIN") {
            self.server.cors_allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("vidhub").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".vidhub").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.access_token_secret.is_empty() {
            anyhow::bail!("ACCESS_TOKEN_SECRET must be set");
        }

        if self.auth.refresh_token_secret.is_empty() {
            anyhow::bail!("REFRESH_TOKEN_SECRET must be set");
        }

        if self.auth.access_token_secret == self.auth.refresh_token_secret {
            anyhow::bail!("Access and refresh token secrets must differ");
        }

        self.auth.access_ttl()?;
        self.auth.refresh_ttl()?;

        if self.general.max_db_connections == 0 {
            anyhow::bail!("max_db_connections must be > 0");
        }

        Ok(())
    }
}

/// Upper bound for a token lifetime (ten years).
pub const MAX_EXPIRY_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Parses `"3600"`, `"30s"`, `"15m"`, `"1h"`, `"10d"` or `"2w"`.
pub fn parse_expiry(input: &str) -> Result<Duration> {
    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits
        .parse()
        .with_context(|| format!("Expiry must start with a number: {input:?}"))?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        other => anyhow::bail!("Unknown expiry unit {other:?} in {input:?}"),
    };

    if value == 0 {
        anyhow::bail!("Expiry must be greater than zero: {input:?}");
    }

    let secs = value
        .checked_mul(multiplier)
        .filter(|secs| *secs <= MAX_EXPIRY_SECS)
        .with_context(|| format!("Expiry exceeds {MAX_EXPIRY_SECS} seconds: {input:?}"))?;

    Ok(Duration::from_secs(secs))
}
