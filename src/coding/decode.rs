//! Strict-but-tolerant decoding of model output into raw codes.
//!
//! Missing theme names are rejected; optional fields fall back to explicit
//! defaults (priority: medium, speaker: the chunk's speaker or "unknown").

use super::{CodingError, Priority, RawCode, UNKNOWN_SPEAKER};
use crate::text::chunking::Chunk;
use crate::util::json::extract_object;
use crate::util::string::ToOption;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodingResponse {
    Themes { themes: Vec<ThemeEntry> },
    // {"<theme>": [{"sub_code": ...}, ...]}
    Legacy(BTreeMap<String, Vec<SubThemeEntry>>),
}

#[derive(Debug, Deserialize)]
struct ThemeEntry {
    #[serde(default, alias = "theme", alias = "name")]
    theme_name: Option<String>,
    #[serde(default, alias = "description")]
    theme_description: Option<String>,
    #[serde(default)]
    sub_themes: Vec<SubThemeEntry>,
}

#[derive(Debug, Deserialize)]
struct SubThemeEntry {
    #[serde(default, alias = "sub_theme", alias = "name")]
    sub_code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, alias = "quote")]
    example_quote: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
}

fn resolve_priority(raw: Option<String>, chunk: &Chunk) -> Priority {
    match raw.to_option() {
        None => Priority::default(),
        Some(p) => Priority::parse(&p).unwrap_or_else(|| {
            warn!(
                "unknown priority {:?} in chunk {}, using {}",
                p,
                chunk.id,
                Priority::default()
            );
            Priority::default()
        }),
    }
}

/// Decode one model response for `chunk`.
pub fn decode_codes(chunk: &Chunk, content: &str) -> Result<Vec<RawCode>, CodingError> {
    let json = extract_object(content)
        .ok_or_else(|| CodingError::parse("no JSON object in model response"))?;
    let response: CodingResponse = serde_json::from_str(json)
        .map_err(|e| CodingError::parse(format!("unexpected response shape: {}", e)))?;

    let themes = match response {
        CodingResponse::Themes { themes } => themes,
        // a "themes" key here means the current shape failed to decode
        CodingResponse::Legacy(map) if map.contains_key("themes") => {
            return Err(CodingError::parse("malformed entries in \"themes\""));
        }
        CodingResponse::Legacy(map) => map
            .into_iter()
            .map(|(name, sub_themes)| ThemeEntry {
                theme_name: Some(name),
                theme_description: None,
                sub_themes,
            })
            .collect(),
    };

    let fallback_speaker = chunk
        .speaker
        .clone()
        .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string());
    let mut codes = Vec::new();
    for (index, theme) in themes.into_iter().enumerate() {
        let theme_name = theme.theme_name.to_option().ok_or_else(|| {
            CodingError::parse(format!("theme #{} in chunk {} has no name", index, chunk.id))
        })?;
        let theme_description = theme.theme_description.to_option();

        if theme.sub_themes.is_empty() {
            let mut code = RawCode::new(chunk.id, codes.len(), theme_name);
            code.theme_description = theme_description;
            code.speaker = Some(fallback_speaker.clone());
            codes.push(code);
            continue;
        }
        for sub in theme.sub_themes {
            let mut code = RawCode::new(chunk.id, codes.len(), theme_name.clone());
            code.theme_description = theme_description.clone();
            code.sub_theme_name = sub.sub_code.to_option();
            code.sub_theme_description = sub.description.to_option();
            code.priority = resolve_priority(sub.priority, chunk);
            code.quote = sub.example_quote.to_option();
            code.speaker = Some(sub.speaker.to_option().unwrap_or_else(|| fallback_speaker.clone()));
            codes.push(code);
        }
    }
    Ok(codes)
}
