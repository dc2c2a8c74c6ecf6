use mongodb::{Client, Database};
use std::{env, path::PathBuf};
use thiserror::Error;

const DEFAULT_DATABASE_NAME: &str = "fleet_admin";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub database_name: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub storage_root: PathBuf,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub login_reset_on_expiry: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests don't have to touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let port = parse_or(&lookup, "PORT", 8080u16)?;
        let public_base_url = lookup("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        url::Url::parse(&public_base_url).map_err(|_| ConfigError::Invalid {
            key: "PUBLIC_BASE_URL",
            value: public_base_url.clone(),
        })?;

        Ok(Self {
            mongodb_uri: required("MONGODB_URI")?,
            database_name: lookup("DATABASE_NAME")
                .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_hours: parse_or(&lookup, "JWT_TTL_HOURS", 24)?,
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            frontend_url: required("FRONTEND_URL")?,
            storage_root: lookup("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./storage")),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            login_reset_on_expiry: parse_or(&lookup, "LOGIN_RESET_ON_EXPIRY", true)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

pub async fn init_database(config: &AppConfig) -> mongodb::error::Result<Database> {
    log::info!("Connecting to MongoDB database: {}", config.database_name);

    let client = Client::with_uri_str(&config.mongodb_uri).await?;

    // Test the connection
    match client.list_database_names(None, None).await {
        Ok(names) => {
            log::info!("Successfully connected to MongoDB. Available databases: {:?}", names);
        }
        Err(e) => {
            log::error!("Failed to list databases: {}", e);
        }
    }

    let database = client.database(&config.database_name);
    crate::db::ensure_indexes(&database).await?;
    Ok(database)
}
