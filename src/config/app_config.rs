use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::search::{RankOptions, TieBreak};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub captcha: CaptchaConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub upload_path: String,
    pub max_file_size: usize, // in bytes
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Master key for the session cookie. Must be at least 32 bytes; when
    /// empty a random key is generated and sessions die with the process.
    pub session_secret: Option<String>,
    pub session_ttl_secs: i64,
    /// Mark the session cookie `Secure` (HTTPS only).
    pub cookie_secure: bool,
    pub min_password_len: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptchaConfig {
    pub length: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub limit: usize,
    pub tie_break: TieBreak,
    pub case_sensitive: bool,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "vidshare.db")?
            .set_default("database.max_connections", 5)?
            .set_default("storage.upload_path", "uploads")?
            .set_default("storage.max_file_size", 500 * 1024 * 1024)? // 500MB
            .set_default("storage.allowed_extensions", vec!["mp4", "avi", "mov", "mkv"])?
            .set_default("auth.session_ttl_secs", 7 * 24 * 3600)?
            .set_default("auth.cookie_secure", false)?
            .set_default("auth.min_password_len", 6)?
            .set_default("captcha.length", 4)?
            .set_default("captcha.width", 160)?
            .set_default("captcha.height", 60)?
            .set_default("search.limit", 10)?
            .set_default("search.tie_break", "lexical")?
            .set_default("search.case_sensitive", false)?
            // Layer on the environment-specific values
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in settings from the environment
            // E.g. `APP__SERVER__PORT=5001 ./target/vidshare` would set `server.port`
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("storage.allowed_extensions")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(secret) = &self.auth.session_secret {
            if !secret.is_empty() && secret.len() < 32 {
                return Err(ConfigError::Message(
                    "auth.session_secret must be at least 32 bytes".into(),
                ));
            }
        }
        if self.captcha.length == 0 {
            return Err(ConfigError::Message("captcha.length must be positive".into()));
        }
        if self.captcha.width == 0 || self.captcha.height == 0 {
            return Err(ConfigError::Message("captcha dimensions must be positive".into()));
        }
        if self.search.limit == 0 {
            return Err(ConfigError::Message("search.limit must be positive".into()));
        }
        Ok(())
    }
}

impl SearchConfig {
    pub fn rank_options(&self) -> RankOptions {
        RankOptions {
            limit: self.limit,
            tie_break: self.tie_break,
            case_sensitive: self.case_sensitive,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "vidshare.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_path: "uploads".to_string(),
            max_file_size: 500 * 1024 * 1024,
            allowed_extensions: ["mp4", "avi", "mov", "mkv"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            session_ttl_secs: 7 * 24 * 3600,
            cookie_secure: false,
            min_password_len: 6,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            length: 4,
            width: 160,
            height: 60,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            tie_break: TieBreak::Lexical,
            case_sensitive: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            captcha: CaptchaConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let mut config = AppConfig::default();
        config.auth.session_secret = Some("too-short".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_search_limit_is_rejected() {
        let mut config = AppConfig::default();
        config.search.limit = 0;
        assert!(config.validate().is_err());
    }
}
