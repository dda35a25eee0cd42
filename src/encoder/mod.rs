//! External conversion coordinator
//!
//! Invokes the external encoder (ffmpeg) to extract embedded subtitle
//! streams from containers and to transcode foreign subtitle files into
//! the ASS intermediate format. The coordinator owns the full process
//! lifecycle: watchdog timeout, forced termination, stderr log capture,
//! and cleanup of partial output on failure.
//!
//! Callers must hold the single-flight lock for the output path before
//! invoking either operation; the existence check at the top of each
//! operation is what turns every waiter behind the first acquirer into
//! a cache hit.

pub mod fontfix;

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::EncoderConfig;
use crate::error::{Result, SubtitleError};

/// Conversion backend seam. The service talks to this trait so tests
/// can observe invocation counts without spawning processes.
#[async_trait]
pub trait SubtitleConverter: Send + Sync {
    /// Pull one embedded subtitle stream out of a container file into
    /// the textual format implied by `output`'s extension. With
    /// `copy_codec` the stream is copied bit-exact instead of being
    /// re-encoded to ASS.
    async fn extract(
        &self,
        input: &Path,
        stream_index: u32,
        copy_codec: bool,
        output: &Path,
    ) -> Result<()>;

    /// Transcode a standalone foreign subtitle file into ASS,
    /// optionally passing a character-encoding hint for the input.
    async fn convert(&self, input: &Path, output: &Path, charenc: Option<&str>) -> Result<()>;
}

/// ffmpeg-backed implementation of [`SubtitleConverter`].
///
/// The watchdog timeout governs the shared external process and is
/// deliberately independent of caller cancellation: a caller that gives
/// up while waiting on the key lock never kills a process other waiters
/// rely on. The process runs to its natural end or the timeout,
/// whichever comes first.
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    log_dir: PathBuf,
    process_timeout: Duration,
    kill_grace: Duration,
}

impl FfmpegEncoder {
    pub fn new(config: &EncoderConfig, log_dir: PathBuf) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            log_dir,
            process_timeout: Duration::from_secs(config.process_timeout_secs),
            kill_grace: Duration::from_millis(config.kill_grace_ms),
        }
    }

    /// Argument vector for a stream extraction. Arguments stay discrete
    /// so a path or language value can never smuggle in extra flags or
    /// a shell pipeline.
    fn extraction_args(
        input: &Path,
        stream_index: u32,
        copy_codec: bool,
        output: &Path,
    ) -> Vec<OsString> {
        vec![
            OsString::from("-i"),
            input.into(),
            OsString::from("-map"),
            OsString::from(format!("0:{}", stream_index)),
            OsString::from("-an"),
            OsString::from("-vn"),
            OsString::from("-c:s"),
            OsString::from(if copy_codec { "copy" } else { "ass" }),
            output.into(),
        ]
    }

    /// Argument vector for a foreign-file conversion.
    fn conversion_args(input: &Path, charenc: Option<&str>, output: &Path) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(enc) = charenc {
            args.push(OsString::from("-sub_charenc"));
            args.push(OsString::from(enc));
        }
        args.push(OsString::from("-i"));
        args.push(input.into());
        args.push(OsString::from("-c:s"));
        args.push(OsString::from("ass"));
        args.push(output.into());
        args
    }

    /// Create the per-invocation stderr log file:
    /// `<log-dir>/ffmpeg-sub-<operation>-<uuid>.txt`.
    fn open_log(&self, operation: &str, args: &[OsString]) -> Result<std::fs::File> {
        std::fs::create_dir_all(&self.log_dir)?;
        let path = self
            .log_dir
            .join(format!("ffmpeg-sub-{}-{}.txt", operation, Uuid::new_v4()));
        let mut file = std::fs::File::create(&path)?;
        use std::io::Write;
        writeln!(
            file,
            "{} {} {}",
            Utc::now().to_rfc3339(),
            self.ffmpeg_path.display(),
            args.iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" "),
        )?;
        Ok(file)
    }

    /// Run one encoder invocation under the coordinator protocol.
    async fn run(&self, operation: &'static str, args: Vec<OsString>, output: &Path) -> Result<()> {
        // Cache hit inside the caller-held lock: the first acquirer did
        // the work, everyone behind it returns here.
        if tokio::fs::try_exists(output).await.unwrap_or(false) {
            tracing::debug!(output = %output.display(), "conversion artifact already cached");
            return Ok(());
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let log_file = self.open_log(operation, &args)?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log_file))
            .spawn()
            .map_err(|source| SubtitleError::ProcessLaunch {
                program: self.ffmpeg_path.to_string_lossy().into_owned(),
                source,
            })?;

        let wait = tokio::time::timeout(self.process_timeout, child.wait()).await;
        let failure_reason = match wait {
            Ok(Ok(status)) if status.success() => None,
            Ok(Ok(status)) => Some(format!("exit status {}", status)),
            Ok(Err(err)) => Some(format!("wait failed: {}", err)),
            Err(_) => {
                // Watchdog expired. Kill, give the process a moment to
                // die, and report failure regardless of any late exit
                // code it produces.
                tracing::warn!(
                    operation,
                    timeout_secs = self.process_timeout.as_secs(),
                    "encoder exceeded timeout, killing"
                );
                if let Err(err) = child.start_kill() {
                    tracing::warn!(operation, error = %err, "failed to signal encoder");
                }
                if tokio::time::timeout(self.kill_grace, child.wait())
                    .await
                    .is_err()
                {
                    tracing::warn!(operation, "encoder did not die within grace period");
                }
                Some(format!(
                    "timed out after {}s",
                    self.process_timeout.as_secs()
                ))
            }
        };

        // Output existence is an independent success condition: a zero
        // exit without the file is still a failure.
        let output_exists = tokio::fs::try_exists(output).await.unwrap_or(false);
        let failure_reason = match (failure_reason, output_exists) {
            (None, true) => None,
            (None, false) => Some("encoder exited 0 but produced no output".to_string()),
            (reason, _) => reason,
        };

        if let Some(reason) = failure_reason {
            cleanup_partial(output).await;
            return Err(SubtitleError::ProcessFailed {
                operation: operation.to_string(),
                output: output.to_path_buf(),
                reason,
            });
        }

        // Extractions and conversions both target the ASS family; give
        // the result a font with real Unicode coverage.
        if matches!(
            output.extension().and_then(|e| e.to_str()),
            Some("ass") | Some("ssa")
        ) {
            fontfix::substitute_font(output).await?;
        }

        tracing::info!(operation, output = %output.display(), "conversion complete");
        Ok(())
    }
}

/// Best-effort removal of a partial output file so a later retry never
/// observes corrupt data. Deletion errors are logged, not propagated:
/// they must not mask the primary failure.
async fn cleanup_partial(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => tracing::debug!(output = %output.display(), "removed partial output"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(output = %output.display(), error = %err, "failed to remove partial output")
        }
    }
}

#[async_trait]
impl SubtitleConverter for FfmpegEncoder {
    async fn extract(
        &self,
        input: &Path,
        stream_index: u32,
        copy_codec: bool,
        output: &Path,
    ) -> Result<()> {
        let args = Self::extraction_args(input, stream_index, copy_codec, output);
        self.run("extract", args, output).await
    }

    async fn convert(&self, input: &Path, output: &Path, charenc: Option<&str>) -> Result<()> {
        let args = Self::conversion_args(input, charenc, output);
        self.run("convert", args, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(dir: &Path, ffmpeg: &str) -> FfmpegEncoder {
        FfmpegEncoder::new(
            &EncoderConfig {
                ffmpeg_path: PathBuf::from(ffmpeg),
                ffprobe_path: PathBuf::from("ffprobe"),
                process_timeout_secs: 5,
                kill_grace_ms: 100,
            },
            dir.join("logs"),
        )
    }

    #[test]
    fn test_extraction_args_shape() {
        let args = FfmpegEncoder::extraction_args(
            Path::new("/media/a movie.mkv"),
            2,
            false,
            Path::new("/cache/out.ass"),
        );
        let rendered: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            vec!["-i", "/media/a movie.mkv", "-map", "0:2", "-an", "-vn", "-c:s", "ass", "/cache/out.ass"]
        );
    }

    #[test]
    fn test_extraction_args_copy_codec() {
        let args =
            FfmpegEncoder::extraction_args(Path::new("in.mkv"), 0, true, Path::new("out.srt"));
        assert!(args.contains(&OsString::from("copy")));
    }

    #[test]
    fn test_conversion_args_with_charenc() {
        let args = FfmpegEncoder::conversion_args(
            Path::new("in.srt"),
            Some("windows-1251"),
            Path::new("out.ass"),
        );
        let rendered: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            rendered,
            vec!["-sub_charenc", "windows-1251", "-i", "in.srt", "-c:s", "ass", "out.ass"]
        );
    }

    #[test]
    fn test_hostile_path_stays_one_argument() {
        // A path that would corrupt a formatted shell string remains a
        // single argv element.
        let hostile = Path::new("in.srt; rm -rf /");
        let args = FfmpegEncoder::conversion_args(hostile, None, Path::new("out.ass"));
        assert_eq!(args[1], OsString::from("in.srt; rm -rf /"));
    }

    #[tokio::test]
    async fn test_existing_output_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("cached.ass");
        tokio::fs::write(&output, "[Events]\n").await.unwrap();

        // A nonexistent binary proves no process is spawned on a hit.
        let enc = encoder(dir.path(), "/nonexistent/ffmpeg");
        enc.extract(Path::new("in.mkv"), 0, false, &output)
            .await
            .unwrap();
        enc.convert(Path::new("in.srt"), &output, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.ass");

        let enc = encoder(dir.path(), "/nonexistent/ffmpeg");
        let err = enc
            .extract(Path::new("in.mkv"), 0, false, &output)
            .await
            .unwrap_err();
        assert!(matches!(err, SubtitleError::ProcessLaunch { .. }));
        // Nothing was produced, nothing to clean up.
        assert!(!output.exists());
    }

    /// Install an executable stub in place of ffmpeg. The stub sees the
    /// real argument vector, so the output path is its last argument.
    #[cfg(unix)]
    fn install_stub(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\neval \"out=\\${{$#}}\"\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_fails_and_cleans_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let stub = install_stub(dir.path(), "echo partial > \"$out\"\nsleep 30");
        let output = dir.path().join("out.ass");

        let enc = FfmpegEncoder::new(
            &EncoderConfig {
                ffmpeg_path: stub,
                ffprobe_path: PathBuf::from("ffprobe"),
                process_timeout_secs: 1,
                kill_grace_ms: 200,
            },
            dir.path().join("logs"),
        );
        let err = enc
            .extract(Path::new("in.mkv"), 0, false, &output)
            .await
            .unwrap_err();
        match err {
            SubtitleError::ProcessFailed { reason, .. } => {
                assert!(reason.contains("timed out"), "reason: {}", reason)
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // The partial artifact must not survive for a later retry to see.
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_fails_and_cleans_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let stub = install_stub(dir.path(), "echo partial > \"$out\"\nexit 3");
        let output = dir.path().join("out.ass");

        let enc = encoder_with(dir.path(), stub);
        let err = enc
            .convert(Path::new("in.srt"), &output, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubtitleError::ProcessFailed { .. }));
        assert!(!output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let stub = install_stub(dir.path(), "exit 0");
        let output = dir.path().join("out.ass");

        let enc = encoder_with(dir.path(), stub);
        let err = enc
            .extract(Path::new("in.mkv"), 0, false, &output)
            .await
            .unwrap_err();
        match err {
            SubtitleError::ProcessFailed { reason, .. } => {
                assert!(reason.contains("no output"), "reason: {}", reason)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_extraction_applies_font_fix() {
        let dir = tempfile::tempdir().unwrap();
        let stub = install_stub(
            dir.path(),
            "printf 'Style: Default,Arial,20\\n' > \"$out\"\nexit 0",
        );
        let output = dir.path().join("out.ass");

        let enc = encoder_with(dir.path(), stub);
        enc.extract(Path::new("in.mkv"), 2, false, &output)
            .await
            .unwrap();
        let text = tokio::fs::read_to_string(&output).await.unwrap();
        assert!(text.contains("Arial Unicode MS"));

        // One diagnostic log per invocation.
        let mut logs = std::fs::read_dir(dir.path().join("logs")).unwrap();
        let entry = logs.next().unwrap().unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("ffmpeg-sub-extract-"));
        assert!(name.ends_with(".txt"));
    }

    #[cfg(unix)]
    fn encoder_with(dir: &Path, ffmpeg: PathBuf) -> FfmpegEncoder {
        FfmpegEncoder::new(
            &EncoderConfig {
                ffmpeg_path: ffmpeg,
                ffprobe_path: PathBuf::from("ffprobe"),
                process_timeout_secs: 5,
                kill_grace_ms: 100,
            },
            dir.join("logs"),
        )
    }

    #[tokio::test]
    async fn test_cleanup_partial_ignores_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_partial(&dir.path().join("never-existed.ass")).await;
    }

    #[tokio::test]
    async fn test_cleanup_partial_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.ass");
        tokio::fs::write(&path, "half a file").await.unwrap();
        cleanup_partial(&path).await;
        assert!(!path.exists());
    }
}
