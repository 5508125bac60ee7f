/// Configuration management for the media service
use crate::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL used when building blob URLs, without trailing slash
    pub public_url: String,
    pub upload_limit: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Staging directory for in-flight uploads; must share a filesystem with `root`
    pub tmp_location: PathBuf,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; empty means any origin
    pub allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> MediaResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> MediaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hostname = lookup("MEDIA_HOSTNAME").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = lookup("MEDIA_PORT")
            .unwrap_or_else(|| "8083".to_string())
            .parse()
            .map_err(|_| MediaError::Config("Invalid port number".to_string()))?;

        let public_url = lookup("MEDIA_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let upload_limit = lookup("MEDIA_UPLOAD_LIMIT")
            .unwrap_or_else(|| "10485760".to_string())
            .parse()
            .map_err(|_| MediaError::Config("Invalid upload limit".to_string()))?;

        let root: PathBuf = lookup("MEDIA_STORAGE_DIR")
            .unwrap_or_else(|| "./data/media".to_string())
            .into();
        let tmp_location = lookup("MEDIA_STORAGE_TMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join(".tmp"));

        let allowed_origins = lookup("MEDIA_CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "*")
            .collect();

        let format = match lookup("MEDIA_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(MediaError::Config(format!("Unknown log format: {}", other)))
            }
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                upload_limit,
            },
            storage: StorageConfig { root, tmp_location },
            cors: CorsConfig { allowed_origins },
            logging: LoggingConfig { format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> MediaResult<()> {
        if self.service.hostname.is_empty() {
            return Err(MediaError::Config("Hostname cannot be empty".to_string()));
        }

        if self.storage.root.as_os_str().is_empty() {
            return Err(MediaError::Config("Storage directory cannot be empty".to_string()));
        }

        if self.service.upload_limit == 0 {
            return Err(MediaError::Config("Upload limit must be positive".to_string()));
        }

        let url = &self.service.public_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MediaError::Config(format!(
                "Public URL must be http(s): {}",
                url
            )));
        }

        Ok(())
    }
}
