//! Configuration module for the ingest server.
//!
//! This module handles loading and validating configuration from TOML files.
//! Configuration can be loaded from a file path or from default locations.
//!
//! # Configuration Sources (in order of priority)
//! 1. `config.local.toml` - Local overrides (gitignored)
//! 2. `config.toml` - Main configuration file
//! 3. Default values
//!
//! # Example
//! ```rust,ignore
//! let config = Config::load("config.toml")?;
//! println!("Server will listen on {}:{}", config.server.host, config.server.port);
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the API to
    pub host: String,
    /// Port for the API
    pub port: u16,
    /// Request timeout in seconds
    pub request_timeout: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for finalised objects
    pub storage_root: PathBuf,
    /// Root directory for staged chunks
    pub staging_root: PathBuf,
    /// Directory for the session store (RocksDB)
    pub session_db_root: PathBuf,
}

/// Upload configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Byte size of every non-final chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Upper bound on declared file size at initiation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Advisory per-batch file limit surfaced via /config
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    /// Set of permitted declared media types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Advisory parallel-chunk hint surfaced via /config
    #[serde(default = "default_max_parallel_uploads")]
    pub max_parallel_uploads: u32,
}

fn default_chunk_size() -> u64 {
    1_048_576
}

fn default_max_file_size() -> u64 {
    524_288_000
}

fn default_max_files() -> u32 {
    10
}

fn default_max_parallel_uploads() -> u32 {
    3
}

fn default_allowed_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "video/mp4",
        "video/quicktime",
        "video/x-msvideo",
        "video/mpeg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl UploadConfig {
    /// Check if a declared media type is allowed
    pub fn is_allowed_type(&self, media_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == media_type)
    }
}

/// Retention and sweeper configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Seconds after which an idle staging directory is swept
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_seconds: u64,
    /// Days after which stored objects are swept
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Interval between staging sweeps in seconds
    #[serde(default = "default_staging_sweep_interval")]
    pub staging_sweep_interval_seconds: u64,
    /// Interval between object sweeps in seconds
    #[serde(default = "default_object_sweep_interval")]
    pub object_sweep_interval_seconds: u64,
}

fn default_chunk_timeout() -> u64 {
    1800
}

fn default_retention_days() -> u64 {
    30
}

fn default_staging_sweep_interval() -> u64 {
    3600
}

fn default_object_sweep_interval() -> u64 {
    86_400
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            chunk_timeout_seconds: default_chunk_timeout(),
            retention_days: default_retention_days(),
            staging_sweep_interval_seconds: default_staging_sweep_interval(),
            object_sweep_interval_seconds: default_object_sweep_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Config {
    /// Load configuration from a file path
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Tries to load from:
    /// 1. `config.local.toml` (if exists)
    /// 2. `config.toml`
    ///
    /// # Errors
    /// Returns `ConfigError` if no configuration file is found
    pub fn load_default() -> Result<Self, ConfigError> {
        // Try local config first
        if Path::new("config.local.toml").exists() {
            return Self::load("config.local.toml");
        }

        // Fall back to main config
        if Path::new("config.toml").exists() {
            return Self::load("config.toml");
        }

        Err(ConfigError::ValidationError(
            "No configuration file found. Expected config.toml or config.local.toml".to_string(),
        ))
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        // Validate chunk size
        if self.upload.chunk_size < 1024 {
            return Err(ConfigError::ValidationError(
                "chunk_size must be at least 1024 bytes".to_string(),
            ));
        }

        // Validate that max_file_size can hold at least one chunk
        if self.upload.max_file_size < self.upload.chunk_size {
            return Err(ConfigError::ValidationError(
                "max_file_size must be >= chunk_size".to_string(),
            ));
        }

        // Validate the media-type allow-list
        if self.upload.allowed_types.is_empty() {
            return Err(ConfigError::ValidationError(
                "allowed_types must not be empty".to_string(),
            ));
        }

        // Validate retention horizon
        if self.retention.retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "retention_days must be at least 1".to_string(),
            ));
        }

        // Staging and storage must not share a root: the object sweeper
        // walks storage_root recursively and must never see staged chunks
        if self.storage.staging_root == self.storage.storage_root {
            return Err(ConfigError::ValidationError(
                "staging_root and storage_root must be different directories".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                request_timeout: 30,
            },
            storage: StorageConfig {
                storage_root: PathBuf::from("/data/storage"),
                staging_root: PathBuf::from("/data/staging"),
                session_db_root: PathBuf::from("/data/sessions"),
            },
            upload: UploadConfig {
                chunk_size: default_chunk_size(),
                max_file_size: default_max_file_size(),
                max_files: default_max_files(),
                allowed_types: default_allowed_types(),
                max_parallel_uploads: default_max_parallel_uploads(),
            },
            retention: RetentionConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn test_allowed_types() {
        let config = base_config();

        assert!(config.upload.is_allowed_type("image/jpeg"));
        assert!(config.upload.is_allowed_type("video/mp4"));
        assert!(!config.upload.is_allowed_type("text/plain"));
        assert!(!config.upload.is_allowed_type("application/pdf"));
    }

    #[test]
    fn test_validate_rejects_tiny_chunks() {
        let mut config = base_config();
        config.upload.chunk_size = 512;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shared_roots() {
        let mut config = base_config();
        config.storage.staging_root = config.storage.storage_root.clone();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        assert_eq!(default_chunk_size(), 1_048_576);
        assert_eq!(default_max_file_size(), 524_288_000);
        assert_eq!(default_chunk_timeout(), 1800);
        assert_eq!(default_retention_days(), 30);
        assert_eq!(default_max_parallel_uploads(), 3);
    }
}
