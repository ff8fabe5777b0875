use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid value for {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    reason: String,
}

/// Process-wide settings, read once at start-up and shared immutably.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub media_root: PathBuf,
    /// Public origin used to build absolute links, without a trailing slash.
    pub base_url: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: try_load("HOST", "127.0.0.1")?,
            port: try_load("PORT", "8080")?,
            database_url: try_load("DATABASE_URL", "foodgram.sqlite3")?,
            media_root: try_load::<String>("MEDIA_ROOT", "media")?.into(),
            base_url: try_load::<String>("BASE_URL", "http://localhost:8080")?
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn media_url(&self, path: &str) -> String {
        format!("{}/media/{}", self.base_url, path)
    }

    pub fn recipe_link(&self, recipe_id: i32) -> String {
        format!("{}/api/recipes/{}", self.base_url, recipe_id)
    }
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError {
            key,
            reason: e.to_string(),
        }
    })
}
