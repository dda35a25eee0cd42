//! SubRip (.srt) parser and writer

use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Result, SubtitleError};
use crate::track::{Cue, Track};

use super::{format_hmsms, SubtitleCodec};

/// SRT timing line: `HH:MM:SS,mmm --> HH:MM:SS,mmm` (a `.` separator
/// is tolerated on input, some tools emit it).
fn timing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{2}):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d{2}):(\d{2}):(\d{2})[,.](\d{3})",
        )
        .unwrap()
    })
}

fn capture_duration(caps: &regex::Captures<'_>, base: usize) -> Duration {
    let h: u64 = caps[base].parse().unwrap_or(0);
    let m: u64 = caps[base + 1].parse().unwrap_or(0);
    let s: u64 = caps[base + 2].parse().unwrap_or(0);
    let ms: u64 = caps[base + 3].parse().unwrap_or(0);
    Duration::from_millis(h * 3_600_000 + m * 60_000 + s * 1_000 + ms)
}

pub struct SrtCodec;

impl SubtitleCodec for SrtCodec {
    fn name(&self) -> &'static str {
        "srt"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["srt", "subrip"]
    }

    fn parse(&self, data: &[u8]) -> Result<Track> {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_start_matches('\u{feff}');

        let mut track = Track::new();
        let mut lines = text.lines().peekable();

        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Blocks start with an optional sequence number followed by
            // the timing line. Tolerate a missing sequence number.
            let timing_line = if line.chars().all(|c| c.is_ascii_digit()) {
                match lines.next() {
                    Some(next) => next.trim(),
                    None => {
                        return Err(SubtitleError::parse(
                            "srt",
                            format!("block '{}' has no timing line", line),
                        ))
                    }
                }
            } else {
                line
            };

            let caps = timing_regex().captures(timing_line).ok_or_else(|| {
                SubtitleError::parse("srt", format!("invalid timing line: '{}'", timing_line))
            })?;
            let start = capture_duration(&caps, 1);
            let end = capture_duration(&caps, 5);

            let mut cue_lines = Vec::new();
            for text_line in lines.by_ref() {
                if text_line.trim().is_empty() {
                    break;
                }
                cue_lines.push(text_line.trim_end());
            }

            track.push(Cue::new(start, end, cue_lines.join("\n")));
        }

        Ok(track)
    }

    fn write(&self, track: &Track, sink: &mut dyn Write) -> Result<()> {
        for (seq, cue) in track.cues.iter().enumerate() {
            writeln!(sink, "{}", seq + 1)?;
            writeln!(
                sink,
                "{} --> {}",
                format_hmsms(cue.start, ','),
                format_hmsms(cue.end, ',')
            )?;
            writeln!(sink, "{}", cue.text)?;
            writeln!(sink)?;
        }
        Ok(())
    }
}
