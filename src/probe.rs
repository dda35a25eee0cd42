//! ffprobe-backed media library
//!
//! Resolves item ids to container files under a configured media root
//! and enumerates their subtitle streams with
//! `ffprobe -print_format json -show_streams`. Sidecar subtitle files
//! next to the container (same stem, known subtitle extension) are
//! surfaced as external streams with indices above the embedded ones.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::library::{MediaLibrary, MediaSource, SubtitleStream};

const SIDECAR_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

pub struct FfprobeLibrary {
    media_root: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfprobeLibrary {
    pub fn new(media_root: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            media_root,
            ffprobe_path,
        }
    }

    /// Resolve an item id (a relative path) against the media root,
    /// rejecting traversal outside it.
    fn resolve(&self, item_id: &str) -> Option<PathBuf> {
        let relative = Path::new(item_id);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }
        Some(self.media_root.join(relative))
    }

    /// Run ffprobe and parse the subtitle streams out of its JSON.
    async fn probe_streams(&self, container: &Path) -> Option<Vec<SubtitleStream>> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
            .arg(container)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            tracing::warn!(container = %container.display(), "ffprobe failed");
            return None;
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
        let streams = value.get("streams")?.as_array()?;
        let mut subtitles = Vec::new();
        for stream in streams {
            if stream.get("codec_type").and_then(|v| v.as_str()) != Some("subtitle") {
                continue;
            }
            let index = stream.get("index").and_then(|v| v.as_u64())? as u32;
            let codec = stream
                .get("codec_name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_ascii_lowercase();
            let language = stream
                .get("tags")
                .and_then(|tags| tags.get("language"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            subtitles.push(SubtitleStream {
                index,
                codec,
                language,
                is_external: false,
                path: None,
            });
        }
        Some(subtitles)
    }

    /// Find sidecar subtitle files sharing the container's stem.
    async fn sidecar_streams(&self, container: &Path, next_index: u32) -> Vec<SubtitleStream> {
        let (Some(parent), Some(stem)) = (container.parent(), container.file_stem()) else {
            return Vec::new();
        };
        let stem = stem.to_string_lossy().into_owned();

        let mut matched = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(parent).await else {
            return Vec::new();
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path == container {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if !SIDECAR_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            let name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
            let Some(name) = name else { continue };
            // Only the exact stem, optionally followed by a dotted
            // language tag (movie.en.srt). A mere prefix match would
            // also pick up movie2.srt next to movie.mkv.
            let rest = match name.strip_prefix(&stem) {
                Some("") => "",
                Some(rest) if rest.starts_with('.') => rest,
                _ => continue,
            };
            let language = Some(rest.trim_start_matches('.').to_string())
                .filter(|tag| !tag.is_empty());
            matched.push((path, ext, language));
        }
        // Indices address streams across lookups and feed the cache
        // key, so they must not depend on directory enumeration order.
        // Sort by path first, then number.
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        matched
            .into_iter()
            .enumerate()
            .map(|(offset, (path, codec, language))| SubtitleStream {
                index: next_index + offset as u32,
                codec,
                language,
                is_external: true,
                path: Some(path),
            })
            .collect()
    }
}

#[async_trait]
impl MediaLibrary for FfprobeLibrary {
    /// The probe-backed library has one source per item; the source id
    /// is expected to be the literal `"file"`.
    async fn lookup(&self, item_id: &str, source_id: &str) -> Option<MediaSource> {
        if source_id != "file" {
            return None;
        }
        let container = self.resolve(item_id)?;
        if !tokio::fs::try_exists(&container).await.unwrap_or(false) {
            return None;
        }

        let mut streams = self.probe_streams(&container).await.unwrap_or_default();
        let next_index = streams.iter().map(|s| s.index + 1).max().unwrap_or(1000);
        streams.extend(self.sidecar_streams(&container, next_index.max(1000)).await);

        Some(MediaSource {
            id: source_id.to_string(),
            container_path: container,
            subtitle_streams: streams,
        })
    }
}
