use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3300;

/// 2 GB upload limit
const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Base of every `fileUrl` handed out by the upload endpoint
    pub public_url: String,
    pub max_upload_bytes: usize,
    /// Served at `/` when set
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset and empty values fall back
    /// to defaults; unparsable numbers are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("LOUNGE_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("LOUNGE_PORT={:?} is not a valid port", raw))?,
            None => DEFAULT_PORT,
        };
        let max_upload_bytes = match get("LOUNGE_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("LOUNGE_MAX_UPLOAD_BYTES={:?} is not a byte count", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            host: get("LOUNGE_HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port,
            db_path: get("LOUNGE_DB_PATH")
                .unwrap_or_else(|| "lounge.db".into())
                .into(),
            upload_dir: get("LOUNGE_UPLOAD_DIR")
                .unwrap_or_else(|| "uploads".into())
                .into(),
            public_url: get("LOUNGE_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            max_upload_bytes,
            static_dir: get("LOUNGE_STATIC_DIR").map(PathBuf::from),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
