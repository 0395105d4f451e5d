use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HORIZONTAL_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\S\n]+").expect("valid horizontal space regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank regex"));
static ORPHAN_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|\n| ),\s*").expect("valid comma regex"));

/// Transcript language, selects the filler-word list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
    Ko,
    Ja,
    #[serde(other)]
    Other,
}

impl Language {
    fn fillers(&self) -> &'static [&'static str] {
        match self {
            Language::En => &[
                "uh",
                "um",
                "like",
                "you know",
                "so",
                "actually",
                "basically",
                "literally",
            ],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    pub language: Language,
    pub strip_fillers: bool,
}

/// Whitespace and encoding normalization for raw transcript text
#[derive(Debug, Clone)]
pub struct Preprocessor {
    filler_regex: Option<Regex>,
}

impl Preprocessor {
    pub fn new(config: &PreprocessConfig) -> Self {
        let fillers = config.language.fillers();
        let filler_regex = if config.strip_fillers && !fillers.is_empty() {
            let alternation = fillers
                .iter()
                .map(|f| regex::escape(f).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)).ok()
        } else {
            None
        };
        Self { filler_regex }
    }

    /// Decode bytes of unknown encoding, then clean.
    pub fn decode_and_clean(&self, raw: &[u8]) -> anyhow::Result<String> {
        let decoded = crate::util::encoding::encode_to_utf8_raw(raw)?;
        Ok(self.clean(&decoded))
    }

    pub fn clean(&self, text: &str) -> String {
        let text = text.trim_start_matches('\u{feff}');
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let text: String = text
            .chars()
            .map(|c| if c.is_control() && c != '\n' { ' ' } else { c })
            .collect();
        let mut text = Self::collapse(&text);

        if let Some(filler) = &self.filler_regex {
            // removing a filler can join two words into another filler
            loop {
                let stripped = filler.replace_all(&text, "");
                let stripped = ORPHAN_COMMA.replace_all(&stripped, "$1");
                let next = Self::collapse(&stripped);
                if next == text {
                    break;
                }
                text = next;
            }
        }
        text
    }

    fn collapse(text: &str) -> String {
        let lines = text
            .split('\n')
            .map(|line| HORIZONTAL_SPACE.replace_all(line, " ").trim().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        BLANK_LINES.replace_all(&lines, "\n\n").trim().to_string()
    }
}
