//! WebVTT (.vtt) parser and writer

use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Result, SubtitleError};
use crate::track::{Cue, Track};

use super::{format_hmsms, SubtitleCodec};

/// WebVTT timing line: hours are optional (`MM:SS.mmm` or
/// `HH:MM:SS.mmm`), cue settings may follow the end time.
fn timing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(\d{2,}):)?(\d{2}):(\d{2})\.(\d{3})\s*-->\s*(?:(\d{2,}):)?(\d{2}):(\d{2})\.(\d{3})[ \t]*(.*)$",
        )
        .unwrap()
    })
}

fn capture_duration(caps: &regex::Captures<'_>, base: usize) -> Duration {
    let h: u64 = caps
        .get(base)
        .map(|m| m.as_str().parse().unwrap_or(0))
        .unwrap_or(0);
    let m: u64 = caps[base + 1].parse().unwrap_or(0);
    let s: u64 = caps[base + 2].parse().unwrap_or(0);
    let ms: u64 = caps[base + 3].parse().unwrap_or(0);
    Duration::from_millis(h * 3_600_000 + m * 60_000 + s * 1_000 + ms)
}

pub struct VttCodec;

impl SubtitleCodec for VttCodec {
    fn name(&self) -> &'static str {
        "vtt"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["vtt", "webvtt"]
    }

    fn parse(&self, data: &[u8]) -> Result<Track> {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_start_matches('\u{feff}');

        let mut lines = text.lines().peekable();
        match lines.next() {
            Some(header) if header.trim_end().starts_with("WEBVTT") => {}
            _ => return Err(SubtitleError::parse("vtt", "missing WEBVTT header")),
        }

        let mut track = Track::new();
        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Skip NOTE / STYLE / REGION blocks up to the next blank line.
            if line.starts_with("NOTE") || line == "STYLE" || line == "REGION" {
                for skipped in lines.by_ref() {
                    if skipped.trim().is_empty() {
                        break;
                    }
                }
                continue;
            }

            // A cue may start with an identifier line before the timing.
            let timing_line = if line.contains("-->") {
                line.to_string()
            } else {
                match lines.next() {
                    Some(next) if next.contains("-->") => next.trim().to_string(),
                    _ => {
                        return Err(SubtitleError::parse(
                            "vtt",
                            format!("cue '{}' has no timing line", line),
                        ))
                    }
                }
            };

            let caps = timing_regex().captures(&timing_line).ok_or_else(|| {
                SubtitleError::parse("vtt", format!("invalid timing line: '{}'", timing_line))
            })?;
            let start = capture_duration(&caps, 1);
            let end = capture_duration(&caps, 5);
            let settings = caps[9].trim().to_string();

            let mut cue_lines = Vec::new();
            for text_line in lines.by_ref() {
                if text_line.trim().is_empty() {
                    break;
                }
                cue_lines.push(text_line.trim_end());
            }

            let mut cue = Cue::new(start, end, cue_lines.join("\n"));
            if !settings.is_empty() {
                cue.position = Some(settings);
            }
            track.push(cue);
        }

        Ok(track)
    }

    fn write(&self, track: &Track, sink: &mut dyn Write) -> Result<()> {
        writeln!(sink, "WEBVTT")?;
        writeln!(sink)?;
        for cue in &track.cues {
            write!(
                sink,
                "{} --> {}",
                format_hmsms(cue.start, '.'),
                format_hmsms(cue.end, '.')
            )?;
            match &cue.position {
                Some(settings) => writeln!(sink, " {}", settings)?,
                None => writeln!(sink)?,
            }
            writeln!(sink, "{}", cue.text)?;
            writeln!(sink)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let vtt = "WEBVTT\n\n00:00:01.000 --> 00:00:02.500\nHello\n\n00:00:03.000 --> 00:00:04.000 line:90%\nWorld\n";
        let track = VttCodec.parse(vtt.as_bytes()).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.cues[0].start, Duration::from_secs(1));
        assert_eq!(track.cues[1].position.as_deref(), Some("line:90%"));
    }

    #[test]
    fn test_parse_identifier_and_short_timestamps() {
        let vtt = "WEBVTT\n\nintro\n00:05.000 --> 00:07.000\nHi there\n";
        let track = VttCodec.parse(vtt.as_bytes()).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues[0].start, Duration::from_secs(5));
        assert_eq!(track.cues[0].text, "Hi there");
    }

    #[test]
    fn test_parse_skips_note_blocks() {
        let vtt = "WEBVTT\n\nNOTE this is a comment\nspanning lines\n\n00:00:01.000 --> 00:00:02.000\nReal cue\n";
        let track = VttCodec.parse(vtt.as_bytes()).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues[0].text, "Real cue");
    }

    #[test]
    fn test_parse_missing_header() {
        let err = VttCodec.parse(b"1\n00:00:01.000 --> 00:00:02.000\nx\n").unwrap_err();
        assert!(matches!(err, SubtitleError::Parse { .. }));
    }

    #[test]
    fn test_write_settings_round_trip() {
        let mut track = Track::new();
        let mut cue = Cue::new(Duration::from_secs(1), Duration::from_secs(2), "Hi");
        cue.position = Some("align:start".to_string());
        track.push(cue);

        let mut out = Vec::new();
        VttCodec.write(&track, &mut out).unwrap();
        let parsed = VttCodec.parse(&out).unwrap();
        assert_eq!(parsed.cues[0].position.as_deref(), Some("align:start"));
    }
}
