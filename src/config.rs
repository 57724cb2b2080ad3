use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub use_secure_cookies: bool,
    pub bcrypt_cost: u32,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

impl Config {
    /// Loads the `.env` file at `env_path`, validates it, and layers the
    /// values over `config/default.toml`.
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;
        Self::from_process_env()
    }

    /// Same as [`Config::from_env`] but reads variables already present in
    /// the process environment.
    pub fn from_process_env() -> Result<Self, config::ConfigError> {
        let database_path = required_var("DATABASE_PATH")?;
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;

        // 64 bytes, hex encoded.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
            ));
        }

        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);
        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(v) => v.parse::<u32>().ok().filter(|c| (4..=31).contains(c)).ok_or_else(|| {
                config::ConfigError::Message(format!("FATAL: 'BCRYPT_COST' must be between 4 and 31, got '{}'.", v))
            })?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        config::Config::builder()
            .set_default("web.host", "127.0.0.1")?
            .set_default("web.port", 8080)?
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml).required(false))
            .set_override("database_path", database_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("bcrypt_cost", i64::from(bcrypt_cost))?
            .build()?
            .try_deserialize()
    }

    /// SQLite file holding users, posts, tags, notes, notifications and invites.
    pub fn sqlite_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("scribe.db")
    }

    /// Redb file holding the per-day view aggregates.
    pub fn views_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("views.redb")
    }
}
