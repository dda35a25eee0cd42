//! Media library collaborator interfaces
//!
//! The subtitle service does not own item metadata; it consumes these
//! traits. `MemoryLibrary` is a programmatic implementation used in
//! tests and by embedders that already know their streams; the
//! ffprobe-backed implementation lives in [`crate::probe`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// One subtitle stream of a media source.
#[derive(Debug, Clone)]
pub struct SubtitleStream {
    /// Stream index within the container (or ordinal for external files)
    pub index: u32,
    /// Codec / format tag as reported by the library (lowercase)
    pub codec: String,
    /// ISO language code, when known
    pub language: Option<String>,
    /// Whether the stream is an externally-authored standalone file
    pub is_external: bool,
    /// Path of the standalone file; None for embedded streams
    pub path: Option<PathBuf>,
}

/// One playable file of a library item.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub id: String,
    /// Container file holding the embedded streams
    pub container_path: PathBuf,
    pub subtitle_streams: Vec<SubtitleStream>,
}

impl MediaSource {
    pub fn subtitle_stream(&self, index: u32) -> Option<&SubtitleStream> {
        self.subtitle_streams.iter().find(|s| s.index == index)
    }
}

/// Library item/source lookup by identifier.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Resolve a media source of an item, or None when either lookup misses.
    async fn lookup(&self, item_id: &str, source_id: &str) -> Option<MediaSource>;
}

/// Character-encoding hint detection for a (file, language) pair.
/// Backed by whatever inspects the source bytes; the coordinator passes
/// the hint through to the encoder verbatim.
#[async_trait]
pub trait CharsetDetector: Send + Sync {
    async fn detect(&self, path: &std::path::Path, language: Option<&str>) -> Option<String>;
}

/// Detector that never offers a hint; the encoder then applies its own
/// input probing.
pub struct NoopCharsetDetector;

#[async_trait]
impl CharsetDetector for NoopCharsetDetector {
    async fn detect(&self, _path: &std::path::Path, _language: Option<&str>) -> Option<String> {
        None
    }
}

/// In-memory library keyed by (item id, source id).
#[derive(Default)]
pub struct MemoryLibrary {
    sources: RwLock<HashMap<(String, String), MediaSource>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, item_id: &str, source: MediaSource) {
        self.sources
            .write()
            .await
            .insert((item_id.to_string(), source.id.clone()), source);
    }
}

#[async_trait]
impl MediaLibrary for MemoryLibrary {
    async fn lookup(&self, item_id: &str, source_id: &str) -> Option<MediaSource> {
        self.sources
            .read()
            .await
            .get(&(item_id.to_string(), source_id.to_string()))
            .cloned()
    }
}
