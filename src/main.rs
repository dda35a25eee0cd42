//! Subtitle Conversion Server
//!
//! Extracts embedded subtitle streams from container files, normalizes
//! external subtitle files into a structured track model, and serves
//! subtitles in a requested output format. Expensive external encoder
//! conversions are content-addressed on disk and guarded by a per-key
//! single-flight lock.

#![allow(dead_code)]

mod cache;
mod config;
mod encoder;
mod error;
mod format;
mod http;
mod library;
mod probe;
mod service;
mod singleflight;
mod track;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::encoder::FfmpegEncoder;
use crate::error::Result;
use crate::http::create_router;
use crate::library::NoopCharsetDetector;
use crate::probe::FfprobeLibrary;
use crate::service::SubtitleService;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "subtitle-server";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        match ServerConfig::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load config file {}: {}. Using defaults.",
                    config_path,
                    e
                );
                ServerConfig::default()
            }
        }
    } else {
        ServerConfig::default()
    };
    tracing::info!("Configuration loaded: {:?}", config);

    // Compose the service: probe-backed library, ffmpeg coordinator.
    let library = Arc::new(FfprobeLibrary::new(
        config.media_root.clone(),
        config.encoder.ffprobe_path.clone(),
    ));
    let converter = Arc::new(FfmpegEncoder::new(
        &config.encoder,
        config.cache.log_dir.clone(),
    ));
    let service = Arc::new(SubtitleService::new(
        &config,
        library,
        converter,
        Arc::new(NoopCharsetDetector),
    ));

    // Build router
    let app = create_router(service);

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| crate::error::SubtitleError::Config(format!("bad listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(crate::error::SubtitleError::Io)?;

    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "subtitle_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
