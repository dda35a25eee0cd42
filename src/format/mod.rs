//! Subtitle format registry
//!
//! Maps format tags (file extensions, case-insensitive) to codecs that
//! can parse raw bytes into a [`Track`](crate::track::Track) and write
//! a track back out. Dispatch is an open registry rather than a
//! hard-coded tag comparison chain, so new formats are added by
//! registering a codec.

pub mod ass;
pub mod srt;
pub mod vtt;

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use crate::error::{Result, SubtitleError};
use crate::track::Track;

/// A subtitle codec: parses raw bytes into a track and serializes a
/// track into this codec's syntax.
pub trait SubtitleCodec: Send + Sync {
    /// Canonical lowercase tag for this format (also its file extension).
    fn name(&self) -> &'static str;

    /// All tags this codec answers to, lowercase (aliases included).
    fn tags(&self) -> &'static [&'static str];

    /// Parse raw bytes into a track. Fails with a parse error on
    /// malformed input; never touches the filesystem.
    fn parse(&self, data: &[u8]) -> Result<Track>;

    /// Serialize a track into the sink.
    fn write(&self, track: &Track, sink: &mut dyn Write) -> Result<()>;
}

impl std::fmt::Debug for dyn SubtitleCodec + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtitleCodec").field("name", &self.name()).finish()
    }
}

/// Registry of subtitle codecs keyed by format tag.
pub struct FormatRegistry {
    codecs: Vec<Arc<dyn SubtitleCodec>>,
    by_tag: HashMap<&'static str, usize>,
}

impl FormatRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            codecs: Vec::new(),
            by_tag: HashMap::new(),
        }
    }

    /// Registry with the built-in codecs: SubRip, ASS/SSA, WebVTT.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(srt::SrtCodec));
        registry.register(Arc::new(ass::AssCodec));
        registry.register(Arc::new(vtt::VttCodec));
        registry
    }

    /// Register a codec under all of its tags.
    pub fn register(&mut self, codec: Arc<dyn SubtitleCodec>) {
        let idx = self.codecs.len();
        for tag in codec.tags() {
            self.by_tag.insert(tag, idx);
        }
        self.codecs.push(codec);
    }

    /// Resolve a parser for the tag, or None when no codec is registered.
    pub fn parser(&self, tag: &str) -> Option<&dyn SubtitleCodec> {
        self.by_tag
            .get(tag.trim().to_ascii_lowercase().as_str())
            .map(|&idx| self.codecs[idx].as_ref())
    }

    /// Resolve a writer for the tag, failing with an unsupported-format
    /// error when no codec is registered.
    pub fn writer(&self, tag: &str) -> Result<&dyn SubtitleCodec> {
        self.parser(tag)
            .ok_or_else(|| SubtitleError::UnsupportedFormat(tag.to_string()))
    }

    /// Whether any codec is registered under the tag.
    pub fn supports(&self, tag: &str) -> bool {
        self.parser(tag).is_some()
    }

    /// Convert in-memory subtitle bytes between two named formats.
    ///
    /// Equal tags (case-insensitive) are a byte-identical passthrough:
    /// no parser or writer runs, so a lossy codec pair cannot degrade
    /// data on a no-op conversion. Results are never cached; this path
    /// is executed fresh per call.
    pub fn convert(&self, data: &[u8], from: &str, to: &str) -> Result<Vec<u8>> {
        let from = from.trim();
        let to = to.trim();
        if from.is_empty() {
            return Err(SubtitleError::InvalidArgument(
                "missing input format".to_string(),
            ));
        }
        if to.is_empty() {
            return Err(SubtitleError::InvalidArgument(
                "missing output format".to_string(),
            ));
        }

        if from.eq_ignore_ascii_case(to) {
            return Ok(data.to_vec());
        }

        let parser = self
            .parser(from)
            .ok_or_else(|| SubtitleError::UnsupportedFormat(from.to_string()))?;
        let writer = self.writer(to)?;

        let track = parser.parse(data)?;
        let mut out = Vec::new();
        writer.write(&track, &mut out)?;
        Ok(out)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Format a duration as `HH:MM:SS<sep>mmm` (SRT uses `,`, WebVTT `.`).
pub(crate) fn format_hmsms(d: std::time::Duration, sep: char) -> String {
    let ms = d.as_millis();
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;
    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, seconds, sep, millis)
}
