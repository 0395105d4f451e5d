//! Consolidation of raw per-chunk codes into per-cluster theme hierarchies
//!
//! Codes of one cluster are merged by normalized theme name (optionally fuzzy),
//! taking the highest priority observed. Codes are sorted by chunk id and
//! ordinal first, so the result does not depend on the order in which
//! responses arrived.

pub mod summary;

use crate::coding::{Priority, RawCode, UNKNOWN_SPEAKER};
use crate::text::chunking::{ChunkId, ClusterId};
use itertools::Itertools;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet};

pub use summary::{
    CommonTheme, ConsolidatedAnalysis, Finding, HierarchyNode, LinkedTheme, PriorityDistribution,
    Summary, ThemeFrequency, code_hierarchy, consolidated_analysis, summarize, summarize_all,
};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;
pub const DEFAULT_TOP_FINDINGS_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostprocessConfig {
    /// Minimum character similarity ratio for fuzzy name matching; 1.0 disables it
    pub similarity_threshold: f64,
    pub top_findings_limit: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_findings_limit: DEFAULT_TOP_FINDINGS_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportingQuote {
    pub text: String,
    pub speaker: String,
    pub chunk_id: ChunkId,
}

impl SupportingQuote {
    fn from_code(code: &RawCode) -> Option<Self> {
        code.quote.as_ref().map(|text| Self {
            text: text.clone(),
            speaker: code
                .speaker
                .clone()
                .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string()),
            chunk_id: code.chunk_id,
        })
    }
}

fn push_quote(quotes: &mut Vec<SupportingQuote>, code: &RawCode) {
    if let Some(quote) = SupportingQuote::from_code(code) {
        if !quotes
            .iter()
            .any(|q| q.text == quote.text && q.chunk_id == quote.chunk_id)
        {
            quotes.push(quote);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTheme {
    pub name: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub occurrences: usize,
    pub first_seen: ChunkId,
    pub supporting_quotes: Vec<SupportingQuote>,
}

impl SubTheme {
    fn new(name: &str, code: &RawCode) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            priority: code.priority,
            occurrences: 0,
            first_seen: code.chunk_id,
            supporting_quotes: vec![],
        }
    }

    fn absorb(&mut self, code: &RawCode) {
        self.occurrences += 1;
        self.priority = self.priority.max(code.priority);
        if self.description.is_none() {
            self.description = code.sub_theme_description.clone();
        }
        push_quote(&mut self.supporting_quotes, code);
    }
}

/// Aggregate of codes that named the theme without a sub-theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeLevelCodes {
    pub priority: Priority,
    pub occurrences: usize,
    pub first_seen: ChunkId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedTheme {
    /// Theme name as first seen
    pub canonical_name: String,
    pub description: Option<String>,
    pub sub_themes: Vec<SubTheme>,
    pub cluster_ids: BTreeSet<ClusterId>,
    pub aggregate_priority: Priority,
    pub occurrences: usize,
    pub first_seen: ChunkId,
    /// Quotes of theme-level codes
    pub supporting_quotes: Vec<SupportingQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_level: Option<ThemeLevelCodes>,
}

impl ConsolidatedTheme {
    fn new(cluster_id: ClusterId, code: &RawCode) -> Self {
        Self {
            canonical_name: code.theme_name.clone(),
            description: None,
            sub_themes: vec![],
            cluster_ids: BTreeSet::from([cluster_id]),
            aggregate_priority: code.priority,
            occurrences: 0,
            first_seen: code.chunk_id,
            supporting_quotes: vec![],
            theme_level: None,
        }
    }

    fn absorb(&mut self, code: &RawCode, threshold: f64) {
        self.occurrences += 1;
        self.aggregate_priority = self.aggregate_priority.max(code.priority);
        if self.description.is_none() {
            self.description = code.theme_description.clone();
        }

        match &code.sub_theme_name {
            Some(name) => {
                let key = normalize(name);
                let keys: Vec<String> = self.sub_themes.iter().map(|s| normalize(&s.name)).collect();
                let idx = match find_match(&keys, &key, threshold) {
                    Some(i) => i,
                    None => {
                        self.sub_themes.push(SubTheme::new(name, code));
                        self.sub_themes.len() - 1
                    }
                };
                self.sub_themes[idx].absorb(code);
            }
            None => {
                let level = self.theme_level.get_or_insert(ThemeLevelCodes {
                    priority: code.priority,
                    occurrences: 0,
                    first_seen: code.chunk_id,
                });
                level.occurrences += 1;
                level.priority = level.priority.max(code.priority);
                push_quote(&mut self.supporting_quotes, code);
            }
        }
    }

    /// Every supporting quote, theme-level first
    pub fn all_quotes(&self) -> impl Iterator<Item = &SupportingQuote> {
        self.supporting_quotes
            .iter()
            .chain(self.sub_themes.iter().flat_map(|s| s.supporting_quotes.iter()))
    }
}

/// Themes of one cluster in first-occurrence order, unique by normalized name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThemeHierarchy {
    themes: Vec<ConsolidatedTheme>,
}

impl ThemeHierarchy {
    pub fn themes(&self) -> &[ConsolidatedTheme] {
        &self.themes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConsolidatedTheme> {
        self.themes.iter()
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    /// Lookup by normalized name
    pub fn get(&self, name: &str) -> Option<&ConsolidatedTheme> {
        let key = normalize(name);
        self.themes.iter().find(|t| normalize(&t.canonical_name) == key)
    }

    pub fn sub_theme_count(&self) -> usize {
        self.themes.iter().map(|t| t.sub_themes.len()).sum()
    }
}

// serialized as a map keyed by canonical name, in hierarchy order
impl Serialize for ThemeHierarchy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.themes.iter().map(|t| (&t.canonical_name, t)))
    }
}

/// Comparison key of a theme or sub-theme name
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = lowered.split_whitespace().join(" ");
    collapsed
        .trim_matches(|c: char| {
            c.is_ascii_punctuation() || matches!(c, '“' | '”' | '‘' | '’' | '«' | '»' | '「' | '」')
        })
        .trim()
        .to_string()
}

/// Character similarity ratio of two normalized names
pub fn similarity(a: &str, b: &str) -> f64 {
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Exact match first, then the most similar key at or above `threshold`.
fn find_match(keys: &[String], key: &str, threshold: f64) -> Option<usize> {
    if let Some(i) = keys.iter().position(|k| k == key) {
        return Some(i);
    }
    if threshold >= 1.0 {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in keys.iter().enumerate() {
        let ratio = similarity(candidate, key);
        if ratio >= threshold && best.is_none_or(|(_, b)| ratio > b) {
            best = Some((i, ratio));
        }
    }
    best.map(|(i, _)| i)
}

pub fn consolidate_cluster(
    cluster_id: ClusterId,
    codes: &[RawCode],
    config: &PostprocessConfig,
) -> ThemeHierarchy {
    let threshold = config.similarity_threshold;
    let mut keys: Vec<String> = vec![];
    let mut themes: Vec<ConsolidatedTheme> = vec![];

    for code in codes.iter().sorted_by_key(|c| (c.chunk_id, c.ordinal)) {
        let key = normalize(&code.theme_name);
        let idx = match find_match(&keys, &key, threshold) {
            Some(i) => i,
            None => {
                keys.push(key);
                themes.push(ConsolidatedTheme::new(cluster_id, code));
                themes.len() - 1
            }
        };
        themes[idx].absorb(code, threshold);
    }
    ThemeHierarchy { themes }
}

/// Raw codes grouped by cluster into one hierarchy per cluster
pub fn consolidate(
    raw_codes: &BTreeMap<ClusterId, Vec<RawCode>>,
    config: &PostprocessConfig,
) -> BTreeMap<ClusterId, ThemeHierarchy> {
    raw_codes
        .iter()
        .map(|(cluster_id, codes)| (*cluster_id, consolidate_cluster(*cluster_id, codes, config)))
        .collect()
}
