use std::path::PathBuf;

use anyhow::{Context, Result};
use platform_db::{DEFAULT_DATABASE_URL, DatabaseSettings};
use platform_obs::{LogFormat, ObsConfig};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub export_dir: PathBuf,
    pub log_format: LogFormat,
    pub log_filter: Option<String>,
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the process environment. Call after `dotenvy` so `.env` values
    /// are visible.
    pub fn load() -> Result<Self> {
        let database_url = DatabaseSettings::default()
            .with_fallback(DEFAULT_DATABASE_URL)
            .database_url()?;

        let export_dir = env_optional("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let log_format = match env_optional("LOG_FORMAT") {
            Some(raw) => raw.parse().context("invalid LOG_FORMAT")?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url,
            export_dir,
            log_format,
            log_filter: env_optional("RUST_LOG"),
            otlp_endpoint: env_optional("OTLP_ENDPOINT"),
        })
    }

    pub fn obs(&self) -> ObsConfig {
        ObsConfig {
            service_name: "deal-pipeline",
            env_filter: self.log_filter.clone(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            format: self.log_format,
        }
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
