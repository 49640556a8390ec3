use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_MAX_ARCHIVE_BYTES: usize = 512 * 1024 * 1024;
/// Total unpacked size an imported archive may expand to.
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub enum AssetBackend {
    Local,
    R2,
}

#[derive(Clone, Debug)]
pub struct R2Settings {
    pub bucket: String,
    pub account_id: String,
    pub access_key: String,
    pub secret_key: String,
    pub prefix: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// In-memory store when unset.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub asset_backend: AssetBackend,
    pub asset_dir: PathBuf,
    pub asset_url_prefix: String,
    pub r2: Option<R2Settings>,
    pub staging_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_archive_bytes: usize,
    pub max_extracted_bytes: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let asset_backend = match env::var("ASSET_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => AssetBackend::Local,
            "r2" => AssetBackend::R2,
            other => {
                return Err(AppError::Config(format!(
                    "ASSET_BACKEND must be 'local' or 'r2', got '{}'",
                    other
                )))
            }
        };

        let r2 = if asset_backend == AssetBackend::R2 {
            Some(R2Settings {
                bucket: required("R2_BUCKET")?,
                account_id: required("R2_ACCOUNT_ID")?,
                access_key: required("R2_ACCESS_KEY_ID")?,
                secret_key: required("R2_SECRET_ACCESS_KEY")?,
                prefix: env::var("R2_PREFIX").unwrap_or_else(|_| "uploads/".to_string()),
            })
        } else {
            None
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parsed("SERVER_PORT", 2105)?,
            asset_backend,
            asset_dir: env::var("ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            asset_url_prefix: env::var("ASSET_URL_PREFIX")
                .unwrap_or_else(|_| "/uploads".to_string()),
            r2,
            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("diecast-staging")),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            max_archive_bytes: parsed("MAX_ARCHIVE_BYTES", DEFAULT_MAX_ARCHIVE_BYTES)?,
            max_extracted_bytes: parsed("MAX_EXTRACTED_BYTES", DEFAULT_MAX_EXTRACTED_BYTES)?,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn required(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Config(format!("{} must be set", name)))
}

fn parsed<T: FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{} is not a valid number: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}
