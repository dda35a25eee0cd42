//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory for cached conversion artifacts
    pub cache_root: PathBuf,

    /// Directory for per-invocation encoder diagnostic logs
    pub log_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// External encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to the ffmpeg executable
    pub ffmpeg_path: PathBuf,

    /// Path to the ffprobe executable
    pub ffprobe_path: PathBuf,

    /// Ceiling on a single conversion process, in seconds.
    /// A process still running after this long is killed and the
    /// conversion reported as failed.
    pub process_timeout_secs: u64,

    /// Grace period after a kill signal before giving up on the
    /// process, in milliseconds.
    pub kill_grace_ms: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            process_timeout_secs: 60,
            kill_grace_ms: 1000,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Root directory of the media library served by the probe-backed
    /// library collaborator
    pub media_root: PathBuf,

    /// Cache configuration
    pub cache: CacheConfig,

    /// External encoder configuration
    pub encoder: EncoderConfig,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            media_root: PathBuf::from("media"),
            cache: CacheConfig::default(),
            encoder: EncoderConfig::default(),
            cors_enabled: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.encoder.process_timeout_secs, 60);
        assert_eq!(config.encoder.kill_grace_ms, 1000);
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.socket_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = ServerConfig {
            port: 9090,
            ..Default::default()
        };
        config.to_file(path.to_str().unwrap()).unwrap();
        let loaded = ServerConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.port, 9090);
        assert_eq!(loaded.encoder.ffmpeg_path, PathBuf::from("ffmpeg"));
    }
}
