//! Speaker turns and participant segments of interview transcripts

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

static SPEAKER_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?m)(?P<p>\bP\d+)[^\n\[]*\[[\d:]+\s*-\s*[\d:]+\]:",
        r"|(?P<m>\bModerator)\s*\[[\d:]+\s*-\s*[\d:]+\]:",
        r"|(?P<s>\b(?:Speaker|Participant) \d+):",
        r"|^(?P<n>[A-Z][\w.'-]*(?: [A-Z][\w.'-]*){0,2}):"
    ))
    .expect("valid speaker label regex")
});

/// Participant segment, derived from the transcript file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantType {
    Buyer,
    Potential,
    #[default]
    Unknown,
}

impl ParticipantType {
    pub fn from_file_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        if upper.contains("POTENTIAL") {
            Self::Potential
        } else if upper.contains("BUYER") {
            Self::Buyer
        } else {
            Self::Unknown
        }
    }

    /// Key of this segment in `objectives.json`
    pub fn objectives_key(&self) -> Option<&'static str> {
        match self {
            Self::Buyer => Some("Buyers"),
            Self::Potential => Some("Potential Buyers"),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Potential => "potential",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ParticipantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: String,
    /// Byte span from the label to the next label
    pub span: Range<usize>,
}

/// Speaker turns detected in a transcript
#[derive(Debug, Clone, Default)]
pub struct SpeakerTurns {
    turns: Vec<Turn>,
}

impl SpeakerTurns {
    pub fn parse(text: &str) -> Self {
        let labels: Vec<(usize, String)> = SPEAKER_LABEL
            .captures_iter(text)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let name = ["p", "m", "s", "n"]
                    .iter()
                    .find_map(|g| caps.name(g))?
                    .as_str()
                    .trim()
                    .to_string();
                Some((start, name))
            })
            .collect();

        let turns = labels
            .iter()
            .enumerate()
            .map(|(i, (start, speaker))| {
                let end = labels.get(i + 1).map(|(s, _)| *s).unwrap_or(text.len());
                Turn {
                    speaker: speaker.clone(),
                    span: *start..end,
                }
            })
            .collect();
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Speaker covering the most bytes of `range`; ties go to the earliest turn.
    pub fn speaker_for(&self, range: Range<usize>) -> Option<&str> {
        let mut best: Option<(&Turn, usize)> = None;
        for turn in &self.turns {
            let start = turn.span.start.max(range.start);
            let end = turn.span.end.min(range.end);
            if end <= start {
                continue;
            }
            let covered = end - start;
            if best.is_none_or(|(_, b)| covered > b) {
                best = Some((turn, covered));
            }
        }
        best.map(|(t, _)| t.speaker.as_str())
    }

    /// Distinct speakers in order of first appearance
    pub fn speakers(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = vec![];
        for turn in &self.turns {
            if !seen.contains(&turn.speaker.as_str()) {
                seen.push(&turn.speaker);
            }
        }
        seen
    }
}
