//! Findings, insights and cross-cluster views over consolidated hierarchies.
//! Everything here is deterministic aggregation; nothing is reported without
//! at least one supporting code.

use super::{ConsolidatedTheme, PostprocessConfig, SupportingQuote, ThemeHierarchy, normalize};
use crate::coding::{Priority, UNKNOWN_SPEAKER};
use crate::text::chunking::{ChunkId, ClusterId};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const HIERARCHY_ROOT: &str = "Qualitative Analysis";
const THEME_FREQUENCY_LIMIT: usize = 10;
const SPEAKER_INSIGHT_THEMES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub cluster_id: ClusterId,
    pub theme: String,
    pub sub_theme: Option<String>,
    pub priority: Priority,
    pub occurrences: usize,
    pub first_seen: ChunkId,
    pub description: Option<String>,
    pub quote: Option<SupportingQuote>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub insights: Vec<String>,
    pub top_findings: Vec<Finding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonTheme {
    pub name: String,
    pub cluster_ids: BTreeSet<ClusterId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeFrequency {
    pub name: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl PriorityDistribution {
    pub fn add(&mut self, priority: Priority) {
        match priority {
            Priority::High => self.high += 1,
            Priority::Medium => self.medium += 1,
            Priority::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// One theme linked across clusters by normalized name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedTheme {
    pub name: String,
    pub cluster_ids: BTreeSet<ClusterId>,
    pub occurrences: usize,
    pub priority: Priority,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedAnalysis {
    pub total_clusters: usize,
    pub total_themes: usize,
    pub total_sub_themes: usize,
    pub common_themes: Vec<CommonTheme>,
    pub priority_distribution: PriorityDistribution,
    pub theme_frequency: Vec<ThemeFrequency>,
    pub linked_themes: Vec<LinkedTheme>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            priority: None,
            children: vec![],
        }
    }
}

type ClusterRef<'a> = (ClusterId, &'a ThemeHierarchy);

struct Link<'a> {
    theme: LinkedTheme,
    members: Vec<&'a ConsolidatedTheme>,
}

fn link<'a>(clusters: &[ClusterRef<'a>]) -> Vec<Link<'a>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut links: Vec<Link<'a>> = vec![];
    for &(cluster_id, hierarchy) in clusters {
        for theme in hierarchy.iter() {
            let key = normalize(&theme.canonical_name);
            let i = *index.entry(key).or_insert_with(|| {
                links.push(Link {
                    theme: LinkedTheme {
                        name: theme.canonical_name.clone(),
                        cluster_ids: BTreeSet::new(),
                        occurrences: 0,
                        priority: theme.aggregate_priority,
                    },
                    members: vec![],
                });
                links.len() - 1
            });
            let linked = &mut links[i];
            linked.theme.cluster_ids.insert(cluster_id);
            linked.theme.occurrences += theme.occurrences;
            linked.theme.priority = linked.theme.priority.max(theme.aggregate_priority);
            linked.members.push(theme);
        }
    }
    links
}

/// Linked themes by occurrences, ties in first-appearance order
fn by_frequency<'a, 'b>(links: &'b [Link<'a>]) -> Vec<&'b Link<'a>> {
    links
        .iter()
        .sorted_by_key(|l| Reverse(l.theme.occurrences))
        .collect()
}

fn analysis_of(clusters: &[ClusterRef<'_>], links: &[Link<'_>]) -> ConsolidatedAnalysis {
    let mut priority_distribution = PriorityDistribution::default();
    for (_, hierarchy) in clusters {
        for sub in hierarchy.iter().flat_map(|t| t.sub_themes.iter()) {
            priority_distribution.add(sub.priority);
        }
    }
    ConsolidatedAnalysis {
        total_clusters: clusters.len(),
        total_themes: links.len(),
        total_sub_themes: priority_distribution.total(),
        common_themes: links
            .iter()
            .filter(|l| l.theme.cluster_ids.len() > 1)
            .map(|l| CommonTheme {
                name: l.theme.name.clone(),
                cluster_ids: l.theme.cluster_ids.clone(),
            })
            .collect(),
        priority_distribution,
        theme_frequency: by_frequency(links)
            .into_iter()
            .take(THEME_FREQUENCY_LIMIT)
            .map(|l| ThemeFrequency {
                name: l.theme.name.clone(),
                occurrences: l.theme.occurrences,
            })
            .collect(),
        linked_themes: links.iter().map(|l| l.theme.clone()).collect(),
    }
}

/// Most frequent known speaker and their quote count; ties go to the first speaker quoted
fn top_speaker<'a>(quotes: impl Iterator<Item = &'a SupportingQuote>) -> Option<(&'a str, usize, usize)> {
    let speakers: Vec<&str> = quotes
        .map(|q| q.speaker.as_str())
        .filter(|s| *s != UNKNOWN_SPEAKER)
        .collect();
    let counts = speakers.iter().counts();
    let mut best: Option<(&str, usize)> = None;
    for speaker in speakers.iter().unique() {
        let n = counts[speaker];
        if best.is_none_or(|(_, b)| n > b) {
            best = Some((*speaker, n));
        }
    }
    best.map(|(s, n)| (s, n, speakers.len()))
}

fn insights_of(analysis: &ConsolidatedAnalysis, links: &[Link<'_>]) -> Vec<String> {
    let mut insights = vec![];
    let distribution = analysis.priority_distribution;
    if distribution.total() > 0 {
        let high_pct = distribution.high as f64 / distribution.total() as f64 * 100.0;
        insights.push(format!(
            "High-priority items represent {:.1}% of all sub-themes, indicating areas requiring immediate attention",
            high_pct
        ));
    }
    if !analysis.common_themes.is_empty() {
        insights.push(format!(
            "Found {} themes that appear across multiple clusters, suggesting cross-cutting issues",
            analysis.common_themes.len()
        ));
    }
    if analysis.total_themes > 0 && analysis.total_clusters > 0 {
        let clusters = links
            .iter()
            .map(|l| l.theme.cluster_ids.len())
            .sum::<usize>() as f64;
        let avg = clusters / analysis.total_clusters as f64;
        insights.push(format!(
            "Average of {:.1} unique themes per cluster indicates {} thematic diversity",
            avg,
            if avg > 3.0 { "high" } else { "moderate" }
        ));
    }
    let ranked = by_frequency(links);
    if let Some(top) = ranked.first() {
        insights.push(format!(
            "'{}' emerged as the most prominent theme across the analysis",
            top.theme.name
        ));
    }
    for linked in ranked.iter().take(SPEAKER_INSIGHT_THEMES) {
        let quotes = linked.members.iter().flat_map(|t| t.all_quotes());
        if let Some((speaker, n, total)) = top_speaker(quotes) {
            insights.push(format!(
                "{} is the most frequent voice on '{}' ({} of {} attributed quotes)",
                speaker, linked.theme.name, n, total
            ));
        }
    }
    insights
}

fn findings_of(cluster_id: ClusterId, hierarchy: &ThemeHierarchy) -> Vec<Finding> {
    let mut findings = vec![];
    for theme in hierarchy.iter() {
        if let Some(level) = theme.theme_level {
            findings.push(Finding {
                cluster_id,
                theme: theme.canonical_name.clone(),
                sub_theme: None,
                priority: level.priority,
                occurrences: level.occurrences,
                first_seen: level.first_seen,
                description: theme.description.clone(),
                quote: theme.supporting_quotes.first().cloned(),
            });
        }
        for sub in &theme.sub_themes {
            findings.push(Finding {
                cluster_id,
                theme: theme.canonical_name.clone(),
                sub_theme: Some(sub.name.clone()),
                priority: sub.priority,
                occurrences: sub.occurrences,
                first_seen: sub.first_seen,
                description: sub.description.clone(),
                quote: sub.supporting_quotes.first().cloned(),
            });
        }
    }
    findings
}

/// Priority desc, occurrences desc, first seen asc, then cluster and names
fn rank(mut findings: Vec<Finding>, limit: usize) -> Vec<Finding> {
    findings.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.occurrences.cmp(&a.occurrences))
            .then(a.first_seen.cmp(&b.first_seen))
            .then(a.cluster_id.cmp(&b.cluster_id))
            .then_with(|| a.theme.cmp(&b.theme))
            .then_with(|| a.sub_theme.cmp(&b.sub_theme))
    });
    findings.truncate(limit);
    findings
}

fn summarize_clusters(clusters: &[ClusterRef<'_>], config: &PostprocessConfig) -> Summary {
    let links = link(clusters);
    let analysis = analysis_of(clusters, &links);
    let findings = clusters
        .iter()
        .flat_map(|&(cluster_id, hierarchy)| findings_of(cluster_id, hierarchy))
        .collect();
    Summary {
        insights: insights_of(&analysis, &links),
        top_findings: rank(findings, config.top_findings_limit),
    }
}

/// Insights and top findings of one cluster
pub fn summarize(
    cluster_id: ClusterId,
    hierarchy: &ThemeHierarchy,
    config: &PostprocessConfig,
) -> Summary {
    summarize_clusters(&[(cluster_id, hierarchy)], config)
}

/// Insights and top findings over all clusters
pub fn summarize_all(
    codes: &BTreeMap<ClusterId, ThemeHierarchy>,
    config: &PostprocessConfig,
) -> Summary {
    let clusters: Vec<ClusterRef<'_>> = codes.iter().map(|(id, h)| (*id, h)).collect();
    summarize_clusters(&clusters, config)
}

/// Global view with themes linked across clusters
pub fn consolidated_analysis(codes: &BTreeMap<ClusterId, ThemeHierarchy>) -> ConsolidatedAnalysis {
    let clusters: Vec<ClusterRef<'_>> = codes.iter().map(|(id, h)| (*id, h)).collect();
    let links = link(&clusters);
    analysis_of(&clusters, &links)
}

/// Root, clusters, themes, sub-themes
pub fn code_hierarchy(codes: &BTreeMap<ClusterId, ThemeHierarchy>) -> HierarchyNode {
    let mut root = HierarchyNode::new(HIERARCHY_ROOT);
    for (cluster_id, hierarchy) in codes {
        let mut cluster = HierarchyNode::new(format!("Cluster {}", cluster_id));
        for theme in hierarchy.iter() {
            let mut node = HierarchyNode::new(theme.canonical_name.clone());
            node.description = theme.description.clone();
            node.priority = Some(theme.aggregate_priority);
            node.children = theme
                .sub_themes
                .iter()
                .map(|sub| HierarchyNode {
                    name: sub.name.clone(),
                    description: sub.description.clone(),
                    priority: Some(sub.priority),
                    children: vec![],
                })
                .collect();
            cluster.children.push(node);
        }
        root.children.push(cluster);
    }
    root
}
