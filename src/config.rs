use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL of the frontend; share links are `{public_url}/download/{id}`
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
    #[serde(default)]
    pub previous_secrets: Vec<String>,
}

/// Which blob backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_local_path")]
    pub local_path: String,
    /// Object endpoint for the remote backend, e.g. `https://objects.example.com/bucket`
    #[serde(default)]
    pub remote_endpoint: String,
    #[serde(default)]
    pub remote_token: Option<String>,
    /// Public base URL for redirects; downloads are proxied when unset
    #[serde(default)]
    pub remote_public_url: Option<String>,
    #[serde(default = "default_storage_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP email API endpoint; messages are only logged when empty
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_hours")]
    pub hours: i64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
}

// Default values
/// Ten years
const MAX_RETENTION_HOURS: i64 = 24 * 365 * 10;
/// 64 GiB
const MAX_UPLOAD_MB: usize = 64 * 1024;

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4888
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_upload_mb() -> usize {
    100
}

fn default_db_path() -> String {
    "data/dropshare.db".to_string()
}

fn default_jwt_secret() -> String {
    "your-super-secret-key-change-it".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Local
}

fn default_local_path() -> String {
    "data/uploads".to_string()
}

fn default_storage_timeout() -> u64 {
    60
}

fn default_mail_from() -> String {
    "no-reply@localhost".to_string()
}

fn default_mail_timeout() -> u64 {
    10
}

fn default_retention_hours() -> i64 {
    24
}

fn default_reaper_interval() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            previous_secrets: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local_path: default_local_path(),
            remote_endpoint: String::new(),
            remote_token: None,
            remote_public_url: None,
            timeout_secs: default_storage_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            from: default_mail_from(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hours: default_retention_hours(),
            reaper_interval_secs: default_reaper_interval(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.validate()?;
        config.ensure_directories()?;
        if config.jwt.secret == default_jwt_secret() {
            tracing::warn!("Using the default JWT secret; set DS_CONF_JWT_SECRET in production");
        }
        Ok(config)
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: DS_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("DS_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("DS_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = env::var("DS_CONF_SERVER_PUBLIC_URL") {
            self.server.public_url = val;
        }
        if let Ok(val) = env::var("DS_CONF_SERVER_MAX_UPLOAD_MB") {
            if let Ok(mb) = val.parse() {
                self.server.max_upload_mb = mb;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("DS_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // JWT overrides
        if let Ok(val) = env::var("DS_CONF_JWT_SECRET") {
            self.jwt.secret = val;
        }
        if let Ok(val) = env::var("DS_CONF_JWT_PREVIOUS_SECRETS") {
            self.jwt.previous_secrets = split_list(&val);
        }

        // Storage overrides
        if let Ok(val) = env::var("DS_CONF_STORAGE_BACKEND") {
            match val.trim().to_lowercase().as_str() {
                "local" => self.storage.backend = StorageBackend::Local,
                "remote" => self.storage.backend = StorageBackend::Remote,
                other => tracing::warn!("Ignoring unknown storage backend {:?}", other),
            }
        }
        if let Ok(val) = env::var("DS_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }
        if let Ok(val) = env::var("DS_CONF_STORAGE_REMOTE_ENDPOINT") {
            self.storage.remote_endpoint = val;
        }
        if let Ok(val) = env::var("DS_CONF_STORAGE_REMOTE_TOKEN") {
            self.storage.remote_token = non_empty(&val);
        }
        if let Ok(val) = env::var("DS_CONF_STORAGE_REMOTE_PUBLIC_URL") {
            self.storage.remote_public_url = non_empty(&val);
        }
        if let Ok(val) = env::var("DS_CONF_STORAGE_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                self.storage.timeout_secs = secs;
            }
        }

        // Mail overrides
        if let Ok(val) = env::var("DS_CONF_MAIL_ENDPOINT") {
            self.mail.endpoint = val;
        }
        if let Ok(val) = env::var("DS_CONF_MAIL_API_KEY") {
            self.mail.api_key = non_empty(&val);
        }
        if let Ok(val) = env::var("DS_CONF_MAIL_FROM") {
            if !val.trim().is_empty() {
                self.mail.from = val;
            }
        }

        // Retention overrides
        if let Ok(val) = env::var("DS_CONF_RETENTION_HOURS") {
            if let Ok(hours) = val.parse() {
                self.retention.hours = hours;
            }
        }
        if let Ok(val) = env::var("DS_CONF_RETENTION_REAPER_INTERVAL") {
            if let Ok(secs) = val.parse() {
                self.retention.reaper_interval_secs = secs;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.retention.hours <= 0 || self.retention.hours > MAX_RETENTION_HOURS {
            anyhow::bail!("retention.hours must be between 1 and {}", MAX_RETENTION_HOURS);
        }
        if self.server.max_upload_mb == 0 || self.server.max_upload_mb > MAX_UPLOAD_MB {
            anyhow::bail!("server.max_upload_mb must be between 1 and {}", MAX_UPLOAD_MB);
        }
        if self.retention.reaper_interval_secs == 0 {
            anyhow::bail!("retention.reaper_interval_secs must be positive");
        }
        if self.storage.backend == StorageBackend::Remote && self.storage.remote_endpoint.is_empty() {
            anyhow::bail!("storage.remote_endpoint is required for the remote backend");
        }
        Ok(())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        if self.storage.backend == StorageBackend::Local {
            fs::create_dir_all(&self.storage.local_path)?;
        }

        Ok(())
    }

    /// Retention window applied to every upload
    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention.hours)
    }

    /// Shareable link handed to uploaders and recipients
    pub fn download_link(&self, id: &str) -> String {
        format!("{}/download/{}", self.server.public_url.trim_end_matches('/'), id)
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// Trimmed value, or None when blank
pub fn non_empty(val: &str) -> Option<String> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retention.hours, 24);
        assert_eq!(config.retention.reaper_interval_secs, 3600);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.retention_window(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            public_url = "https://share.example.com/"

            [storage]
            backend = "remote"
            remote_endpoint = "https://objects.example.com/bucket"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 4888);
        assert_eq!(config.storage.backend, StorageBackend::Remote);
        assert_eq!(config.mail.timeout_secs, 10);
        assert_eq!(
            config.download_link("abc"),
            "https://share.example.com/download/abc"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_requires_endpoint() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Remote;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let mut config = Config::default();
        config.retention.hours = 0;
        assert!(config.validate().is_err());
        config.retention.hours = i64::MAX;
        assert!(config.validate().is_err());
        config.retention.hours = MAX_RETENTION_HOURS;
        assert!(config.validate().is_ok());

        config.server.max_upload_mb = usize::MAX;
        assert!(config.validate().is_err());
        config.server.max_upload_mb = 0;
        assert!(config.validate().is_err());
        config.server.max_upload_mb = MAX_UPLOAD_MB;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" a@b.com "), Some("a@b.com".to_string()));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list(" a, ,b "), vec!["a".to_string(), "b".to_string()]);
    }
}
