//! Subtitle service orchestrator
//!
//! Composes the cache-key resolver, single-flight lock registry,
//! external conversion coordinator, and format registry to answer
//! "give me subtitle stream S of item I in format F".

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::cache;
use crate::config::ServerConfig;
use crate::encoder::SubtitleConverter;
use crate::error::{Result, SubtitleError};
use crate::format::FormatRegistry;
use crate::library::{CharsetDetector, MediaLibrary, SubtitleStream};
use crate::singleflight::LockRegistry;

/// Extraction and foreign-file conversion both target the ASS family:
/// the richest commonly-parseable structured form. The requested output
/// format is produced from it by the in-memory pipeline.
const INTERMEDIATE_EXT: &str = "ass";

pub struct SubtitleService {
    cache_root: PathBuf,
    library: Arc<dyn MediaLibrary>,
    converter: Arc<dyn SubtitleConverter>,
    charset: Arc<dyn CharsetDetector>,
    locks: LockRegistry,
    registry: FormatRegistry,
}

impl SubtitleService {
    pub fn new(
        config: &ServerConfig,
        library: Arc<dyn MediaLibrary>,
        converter: Arc<dyn SubtitleConverter>,
        charset: Arc<dyn CharsetDetector>,
    ) -> Self {
        Self {
            cache_root: config.cache.cache_root.clone(),
            library,
            converter,
            charset,
            locks: LockRegistry::new(),
            registry: FormatRegistry::with_defaults(),
        }
    }

    /// Convert in-memory subtitle bytes between two named formats.
    /// Pure, uncached; equal tags are a byte-identical passthrough.
    pub fn convert_text(&self, data: &[u8], from: &str, to: &str) -> Result<Vec<u8>> {
        self.registry.convert(data, from, to)
    }

    /// Number of cache keys with an in-flight conversion or waiter.
    pub fn live_locks(&self) -> usize {
        self.locks.live_locks()
    }

    /// Fetch one subtitle stream of a library item, converted to the
    /// requested output format, as a fully-buffered payload.
    pub async fn get_subtitle(
        &self,
        item_id: &str,
        source_id: &str,
        stream_index: u32,
        out_format: &str,
    ) -> Result<Bytes> {
        if item_id.trim().is_empty() {
            return Err(SubtitleError::InvalidArgument("missing item id".to_string()));
        }
        if source_id.trim().is_empty() {
            return Err(SubtitleError::InvalidArgument(
                "missing media source id".to_string(),
            ));
        }
        // Reject an unknown output format before any lookup or
        // conversion side effect.
        let out_format = out_format.trim();
        self.registry.writer(out_format)?;

        let source = self
            .library
            .lookup(item_id, source_id)
            .await
            .ok_or_else(|| SubtitleError::SourceNotFound {
                item_id: item_id.to_string(),
                source_id: source_id.to_string(),
            })?;
        let stream = source.subtitle_stream(stream_index).ok_or_else(|| {
            SubtitleError::StreamNotFound {
                source_id: source_id.to_string(),
                index: stream_index,
            }
        })?;

        let (path, format) = self
            .resolve_readable(&source.container_path, stream)
            .await?;

        // Buffer the whole artifact; a failed read drops the partial
        // buffer before the error propagates.
        let data = tokio::fs::read(&path).await?;
        let converted = self.registry.convert(&data, &format, out_format)?;
        Ok(Bytes::from(converted))
    }

    /// Decide the source read strategy and materialize whatever
    /// intermediate artifact it requires:
    /// embedded stream -> extract to cached ASS;
    /// external file in a parseable format -> read as-is;
    /// external file in an unparseable format -> convert to cached ASS.
    async fn resolve_readable(
        &self,
        container: &Path,
        stream: &SubtitleStream,
    ) -> Result<(PathBuf, String)> {
        if !stream.is_external {
            let mtime = file_mtime(container).await?;
            let output = cache::cache_path(
                &self.cache_root,
                container,
                stream.index,
                mtime,
                INTERMEDIATE_EXT,
            );
            // Copying the packet data bit-exact beats re-encoding when
            // the embedded codec already is the intermediate format.
            let copy_codec = matches!(stream.codec.as_str(), "ass" | "ssa");

            let key = output.to_string_lossy().into_owned();
            let _guard = self.locks.acquire(&key).await;
            self.converter
                .extract(container, stream.index, copy_codec, &output)
                .await?;
            return Ok((output, INTERMEDIATE_EXT.to_string()));
        }

        let external = stream.path.clone().ok_or_else(|| {
            SubtitleError::InvalidArgument(format!(
                "external stream {} has no file path",
                stream.index
            ))
        })?;

        if self.registry.supports(&stream.codec) {
            return Ok((external, stream.codec.clone()));
        }

        let mtime = file_mtime(&external).await?;
        let output = cache::cache_path(
            &self.cache_root,
            &external,
            stream.index,
            mtime,
            INTERMEDIATE_EXT,
        );
        let charenc = self
            .charset
            .detect(&external, stream.language.as_deref())
            .await;

        let key = output.to_string_lossy().into_owned();
        let _guard = self.locks.acquire(&key).await;
        self.converter
            .convert(&external, &output, charenc.as_deref())
            .await?;
        Ok((output, INTERMEDIATE_EXT.to_string()))
    }
}

/// Last-write time of a file, for cache-key derivation.
async fn file_mtime(path: &Path) -> Result<SystemTime> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok(metadata.modified()?)
}
