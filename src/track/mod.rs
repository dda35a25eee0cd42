//! Structured subtitle track model
//!
//! A `Track` is an ordered sequence of `Cue`s in presentation order.
//! The pipeline never re-sorts cues; whatever ordering the source
//! encodes is what a writer sees.

use std::time::Duration;

/// One timed subtitle event.
///
/// Cues are independent value records; a cue never references the
/// track that contains it. `end >= start` is expected but not
/// enforced here; writers handle degenerate ranges permissively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// Presentation start offset
    pub start: Duration,
    /// Presentation end offset
    pub end: Duration,
    /// Cue text; multiple lines are joined with `\n`
    pub text: String,
    /// Opaque style name, for formats that carry one (ASS/SSA)
    pub style: Option<String>,
    /// Opaque position/settings metadata, for formats that carry it
    pub position: Option<String>,
}

impl Cue {
    /// Create a plain cue with no style or position metadata.
    pub fn new(start: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            style: None,
            position: None,
        }
    }

    /// Cue duration; zero for degenerate ranges.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Lines of the cue text.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }
}

/// An ordered sequence of cues representing one subtitle stream.
///
/// Created fresh per parse call and owned exclusively by the caller;
/// discarded after serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub cues: Vec<Cue>,
}

impl Track {
    pub fn new() -> Self {
        Self { cues: Vec::new() }
    }

    pub fn push(&mut self, cue: Cue) {
        self.cues.push(cue);
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}
