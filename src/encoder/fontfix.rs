//! ASS font-substitution post-process
//!
//! ffmpeg emits `Arial` in the style lines of extracted ASS tracks.
//! Arial has poor glyph coverage outside Latin scripts, so successful
//! extractions are rewritten to reference a Unicode-capable font. The
//! rewrite is purely textual, preserves the file's original encoding
//! and byte-order mark, and only touches the file when the replacement
//! actually changed something, so running it twice is a no-op.

use std::path::Path;

use crate::error::Result;

const SEARCH: &str = ",Arial,";
const REPLACEMENT: &str = ",Arial Unicode MS,";

/// Text encoding recognized from a byte-order mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BomEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
}

/// Detect the encoding of subtitle bytes from their BOM; BOM-less input
/// is treated as UTF-8.
pub fn detect_encoding(data: &[u8]) -> BomEncoding {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        BomEncoding::Utf8Bom
    } else if data.starts_with(&[0xFF, 0xFE]) {
        BomEncoding::Utf16Le
    } else if data.starts_with(&[0xFE, 0xFF]) {
        BomEncoding::Utf16Be
    } else {
        BomEncoding::Utf8
    }
}

fn decode(data: &[u8], encoding: BomEncoding) -> String {
    match encoding {
        BomEncoding::Utf8 => String::from_utf8_lossy(data).into_owned(),
        BomEncoding::Utf8Bom => String::from_utf8_lossy(&data[3..]).into_owned(),
        BomEncoding::Utf16Le | BomEncoding::Utf16Be => {
            let units: Vec<u16> = data[2..]
                .chunks_exact(2)
                .map(|pair| {
                    if encoding == BomEncoding::Utf16Le {
                        u16::from_le_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_be_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16_lossy(&units)
        }
    }
}

fn encode(text: &str, encoding: BomEncoding) -> Vec<u8> {
    match encoding {
        BomEncoding::Utf8 => text.as_bytes().to_vec(),
        BomEncoding::Utf8Bom => {
            let mut out = vec![0xEF, 0xBB, 0xBF];
            out.extend_from_slice(text.as_bytes());
            out
        }
        BomEncoding::Utf16Le => {
            let mut out = vec![0xFF, 0xFE];
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            out
        }
        BomEncoding::Utf16Be => {
            let mut out = vec![0xFE, 0xFF];
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
            out
        }
    }
}

/// Replace the Arial style-font marker with a Unicode-capable font in
/// the file at `path`, rewriting it in its original encoding. The file
/// is left untouched when no marker is present. Idempotent.
pub async fn substitute_font(path: &Path) -> Result<()> {
    let data = tokio::fs::read(path).await?;
    let encoding = detect_encoding(&data);
    let text = decode(&data, encoding);

    let replaced = text.replace(SEARCH, REPLACEMENT);
    if replaced == text {
        return Ok(());
    }

    tokio::fs::write(path, encode(&replaced, encoding)).await?;
    tracing::debug!(path = %path.display(), "substituted Unicode-capable font");
    Ok(())
}
