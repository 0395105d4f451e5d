use super::CodingContext;
use crate::text::chunking::Chunk;
use serde_json::Value;

pub const SYSTEM_PROMPT: &str = "You are an expert qualitative researcher specializing in \
market research and thematic analysis.";

const RESPONSE_FORMAT: &str = r#"Respond only with a JSON object of this shape:
{
  "themes": [
    {
      "theme_name": "short label of the theme",
      "theme_description": "what participants said",
      "sub_themes": [
        {
          "sub_code": "specific finding",
          "description": "why it matters",
          "priority": "high|medium|low",
          "example_quote": "exact quote copied from the segment",
          "speaker": "speaker label from the segment, e.g. P1 or Moderator"
        }
      ]
    }
  ]
}
Quotes must be copied verbatim from the segment. Return {"themes": []} if nothing is relevant."#;

// long reference documents are cut to keep the request small
const MAX_DOCUMENT_CHARS: usize = 2000;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}...", &text[..i]),
        None => text.to_string(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| format!("- {}", s)))
                .collect()
        })
        .unwrap_or_default()
}

/// Research context for the chunk's participant segment
pub fn context_section(context: &CodingContext) -> String {
    let project = &context.project;
    let mut sections: Vec<String> = vec![];

    if let Some(group) = context.participant_type.objectives_key().and_then(|key| {
        project
            .objectives
            .as_ref()
            .and_then(|o| o.get(key))
            .map(|g| (key, g))
    }) {
        let (key, objectives) = group;
        let goals = string_list(objectives.get("Research Objectives"));
        let questions = string_list(objectives.get("Key Research Questions"));
        if !goals.is_empty() || !questions.is_empty() {
            sections.push(format!(
                "RESEARCH CONTEXT FOR {}:\nResearch Objectives:\n{}\n\nKey Questions to Address:\n{}",
                key.to_uppercase(),
                goals.join("\n"),
                questions.join("\n")
            ));
        }
    }
    if let Some(brief) = &project.research_brief {
        sections.push(format!(
            "RESEARCH BRIEF:\n{}",
            truncate(brief, MAX_DOCUMENT_CHARS)
        ));
    }
    if let Some(brand) = &project.brand_context {
        let rendered = serde_json::to_string_pretty(brand).unwrap_or_else(|_| brand.to_string());
        sections.push(format!(
            "BRAND CONTEXT:\n{}",
            truncate(&rendered, MAX_DOCUMENT_CHARS)
        ));
    }
    if let Some(competitors) = &project.competitor_analysis {
        sections.push(format!(
            "COMPETITOR ANALYSIS:\n{}",
            truncate(competitors, MAX_DOCUMENT_CHARS)
        ));
    }
    sections.join("\n\n")
}

/// User message for one chunk
pub fn user_prompt(chunk: &Chunk, context: &CodingContext) -> String {
    let context_section = context_section(context);
    let mut prompt = String::new();
    if !context_section.is_empty() {
        prompt.push_str(&context_section);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "Transcript segment (participant type: {}, speaker: {}):\n{}\n\n",
        context.participant_type,
        chunk.speaker_or_unknown(),
        chunk.text
    ));
    prompt.push_str(
        "Identify the key themes in this segment that are relevant to the research objectives. \
         For each theme give specific sub-themes with a priority.\n\n",
    );
    prompt.push_str(RESPONSE_FORMAT);
    prompt
}
