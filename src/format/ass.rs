//! Advanced SubStation Alpha (.ass/.ssa) parser and writer
//!
//! This is the richest commonly-parseable structured subtitle form and
//! the fixed intermediate format every embedded extraction targets.
//! Parsing keeps cue timing, style name, and text; inline override
//! blocks (`{\...}`) are stripped because the track model carries
//! lightly-styled text only.

use std::io::Write;
use std::time::Duration;

use crate::error::{Result, SubtitleError};
use crate::track::{Cue, Track};

use super::SubtitleCodec;

/// Default v4+ Events field order, used when a [Events] section carries
/// no Format line.
const DEFAULT_EVENT_FIELDS: &[&str] = &[
    "Layer", "Start", "End", "Style", "Name", "MarginL", "MarginR", "MarginV", "Effect", "Text",
];

/// Parse an ASS timestamp `H:MM:SS.cc` (centiseconds).
fn parse_ass_time(s: &str) -> Option<Duration> {
    let mut parts = s.trim().splitn(3, ':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let sec_part = parts.next()?;
    let (sec, centi): (u64, u64) = match sec_part.split_once('.') {
        Some((sec, centi)) => (sec.parse().ok()?, centi.parse().ok()?),
        None => (sec_part.parse().ok()?, 0u64),
    };
    Some(Duration::from_millis(
        h * 3_600_000 + m * 60_000 + sec * 1_000 + centi * 10,
    ))
}

/// Format a duration as an ASS timestamp `H:MM:SS.cc`.
fn format_ass_time(d: Duration) -> String {
    let centis = d.as_millis() / 10;
    let hours = centis / 360_000;
    let minutes = (centis % 360_000) / 6_000;
    let seconds = (centis % 6_000) / 100;
    let centi = centis % 100;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, seconds, centi)
}

/// Strip `{...}` override blocks and normalize `\N`/`\n` line breaks.
fn clean_event_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_override = false;
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => in_override = true,
            '}' if in_override => in_override = false,
            _ if in_override => {}
            '\\' => match chars.peek() {
                Some('N') | Some('n') => {
                    chars.next();
                    out.push('\n');
                }
                Some('h') => {
                    chars.next();
                    out.push(' ');
                }
                _ => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
    out
}

pub struct AssCodec;

impl SubtitleCodec for AssCodec {
    fn name(&self) -> &'static str {
        "ass"
    }

    fn tags(&self) -> &'static [&'static str] {
        &["ass", "ssa"]
    }

    fn parse(&self, data: &[u8]) -> Result<Track> {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_start_matches('\u{feff}');

        let mut track = Track::new();
        let mut in_events = false;
        let mut fields: Vec<String> = DEFAULT_EVENT_FIELDS.iter().map(|s| s.to_string()).collect();
        let mut saw_events = false;

        for line in text.lines() {
            let line = line.trim();
            if line.starts_with('[') {
                in_events = line.eq_ignore_ascii_case("[Events]");
                saw_events |= in_events;
                continue;
            }
            if !in_events || line.is_empty() || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("Format:") {
                fields = rest.split(',').map(|f| f.trim().to_string()).collect();
                continue;
            }

            let Some(rest) = line.strip_prefix("Dialogue:") else {
                // Comment:, Picture:, etc. carry no cue.
                continue;
            };

            // Text is the final field and may itself contain commas.
            let values: Vec<&str> = rest.splitn(fields.len(), ',').collect();
            if values.len() < fields.len() {
                return Err(SubtitleError::parse(
                    "ass",
                    format!("dialogue line has {} of {} fields", values.len(), fields.len()),
                ));
            }

            let mut start = None;
            let mut end = None;
            let mut style = None;
            let mut raw_text = "";
            for (name, value) in fields.iter().zip(values.iter()) {
                match name.as_str() {
                    "Start" => start = parse_ass_time(value),
                    "End" => end = parse_ass_time(value),
                    "Style" => {
                        let v = value.trim();
                        if !v.is_empty() {
                            style = Some(v.to_string());
                        }
                    }
                    "Text" => raw_text = value,
                    _ => {}
                }
            }

            let start = start
                .ok_or_else(|| SubtitleError::parse("ass", format!("bad start time: '{}'", rest)))?;
            let end = end
                .ok_or_else(|| SubtitleError::parse("ass", format!("bad end time: '{}'", rest)))?;

            let mut cue = Cue::new(start, end, clean_event_text(raw_text));
            cue.style = style;
            track.push(cue);
        }

        if !saw_events {
            return Err(SubtitleError::parse("ass", "no [Events] section"));
        }

        Ok(track)
    }

    fn write(&self, track: &Track, sink: &mut dyn Write) -> Result<()> {
        writeln!(sink, "[Script Info]")?;
        writeln!(sink, "ScriptType: v4.00+")?;
        writeln!(sink)?;
        writeln!(sink, "[V4+ Styles]")?;
        writeln!(
            sink,
            "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
             OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, \
             Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, \
             MarginV, Encoding"
        )?;
        writeln!(
            sink,
            "Style: Default,Arial,20,&H00FFFFFF,&H000000FF,&H00000000,&H00000000,\
             0,0,0,0,100,100,0,0,1,2,0,2,10,10,10,1"
        )?;
        writeln!(sink)?;
        writeln!(sink, "[Events]")?;
        writeln!(
            sink,
            "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
        )?;
        for cue in &track.cues {
            writeln!(
                sink,
                "Dialogue: 0,{},{},{},,0,0,0,,{}",
                format_ass_time(cue.start),
                format_ass_time(cue.end),
                cue.style.as_deref().unwrap_or("Default"),
                cue.text.replace('\n', "\\N"),
            )?;
        }
        Ok(())
    }
}
