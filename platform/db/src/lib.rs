//! Database primitives for the pipeline: settings, connection, the SeaORM
//! deal repository and demo seed data.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

mod repository;
mod seed;

pub use repository::{SeaDealRepository, load_companies, load_contacts, stage_from_db, stage_to_db};
pub use seed::{SeedReport, seed_pipeline_demo};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://pipeline.db?mode=rwc";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (set {0})")]
    MissingUrl(String),
    #[error("database connection failed: {0}")]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default)]
    fallback_url: Option<String>,
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            env_key: default_url_key(),
            fallback_url: None,
        }
    }
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            fallback_url: None,
        }
    }

    /// URL used when the env key is unset or blank.
    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallback_url = Some(url.into());
        self
    }

    pub fn env_key(&self) -> &str {
        &self.env_key
    }

    pub fn database_url(&self) -> DbResult<String> {
        match std::env::var(&self.env_key) {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ => self
                .fallback_url
                .clone()
                .ok_or_else(|| DbError::MissingUrl(self.env_key.clone())),
        }
    }
}

pub async fn connect(url: &str) -> DbResult<DatabaseConnection> {
    let mut options = ConnectOptions::new(url.to_owned());
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    info!(backend = ?db.get_database_backend(), "database connected");
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_applies_when_key_is_unset() {
        let settings = DatabaseSettings::new("PIPELINE_TEST_UNSET_DATABASE_URL");
        assert!(matches!(
            settings.database_url(),
            Err(DbError::MissingUrl(key)) if key == "PIPELINE_TEST_UNSET_DATABASE_URL"
        ));

        let settings = settings.with_fallback(DEFAULT_DATABASE_URL);
        assert_eq!(settings.database_url().unwrap(), DEFAULT_DATABASE_URL);
    }
}
