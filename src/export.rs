//! Result files. Every format is a view over [`AnalysisResult`]; files are
//! written to a temp file in the target directory and then persisted.

use crate::coding::Priority;
use crate::error::{AnalysisError, Result};
use crate::pipeline::AnalysisResult;
use crate::postprocess::{Finding, HierarchyNode};
use crate::util::datetime;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

pub const FILE_STEM_PREFIX: &str = "qualitative_analysis";
const SUMMARY_FINDINGS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExportFormat {
    Json,
    Markdown,
    Csv,
    Text,
    Summary,
    Hierarchy,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 6] = [
        ExportFormat::Json,
        ExportFormat::Markdown,
        ExportFormat::Csv,
        ExportFormat::Text,
        ExportFormat::Summary,
        ExportFormat::Hierarchy,
    ];

    /// Appended to the file stem
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::Markdown => ".md",
            Self::Csv => "_codes.csv",
            Self::Text => ".txt",
            Self::Summary => "_summary.md",
            Self::Hierarchy => "_hierarchy.json",
        }
    }

    pub fn render(&self, result: &AnalysisResult) -> Result<String> {
        match self {
            Self::Json => render_json(result),
            Self::Markdown => Ok(render_markdown(result)),
            Self::Csv => render_csv(result),
            Self::Text => Ok(render_text(result)),
            Self::Summary => Ok(render_summary(result)),
            Self::Hierarchy => render_hierarchy(result),
        }
    }
}

/// Writes result files under `<output_root>/<project>/`
#[derive(Debug, Clone)]
pub struct Exporter {
    output_root: PathBuf,
}

impl Exporter {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn project_dir(&self, project_name: &str) -> PathBuf {
        self.output_root.join(project_name)
    }

    /// Write the requested formats; JSON is always included.
    pub fn export(&self, result: &AnalysisResult, formats: &[ExportFormat]) -> Result<Vec<PathBuf>> {
        let dir = self.project_dir(&result.project_name);
        fs::create_dir_all(&dir).map_err(|e| AnalysisError::io(&dir, e))?;

        let stem = format!("{}_{}", FILE_STEM_PREFIX, datetime::file_stamp(&result.timestamp));
        let mut formats = formats.to_vec();
        formats.push(ExportFormat::Json);
        formats.sort();
        formats.dedup();

        let mut written = vec![];
        for format in formats {
            let path = dir.join(format!("{}{}", stem, format.suffix()));
            write_atomic(&path, &format.render(result)?)?;
            info!("wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir).map_err(|e| AnalysisError::io(dir, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| AnalysisError::io(file.path(), e))?;
    file.persist(path)
        .map_err(|e| AnalysisError::io(path, e.error))?;
    Ok(())
}

pub fn render_json(result: &AnalysisResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

fn cluster_label(result: &AnalysisResult, cluster_id: u32) -> String {
    match result.source_file(cluster_id) {
        Some(source) => format!(
            "Cluster {}: {} ({})",
            cluster_id, source.file_name, source.participant_type
        ),
        None => format!("Cluster {}", cluster_id),
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn finding_label(finding: &Finding) -> String {
    match &finding.sub_theme {
        Some(sub) => format!("{} / {}", finding.theme, sub),
        None => finding.theme.clone(),
    }
}

pub fn render_markdown(result: &AnalysisResult) -> String {
    let mut md = String::new();
    let analysis = &result.consolidated_analysis;
    let _ = writeln!(md, "# Qualitative Analysis: {}\n", result.project_name);
    let _ = writeln!(
        md,
        "_Generated {} with {}_\n",
        result.timestamp.format("%Y-%m-%d %H:%M:%S"),
        result.model
    );

    md.push_str("## Overview\n\n");
    let _ = writeln!(md, "- Transcripts analyzed: {}", result.source_files.len());
    let _ = writeln!(
        md,
        "- Chunks: {} (average {:.0} characters)",
        result.chunk_info.total_chunks, result.chunk_info.average_chunk_length
    );
    let _ = writeln!(md, "- Themes: {}", analysis.total_themes);
    let _ = writeln!(md, "- Sub-themes: {}", analysis.total_sub_themes);
    let _ = writeln!(md, "- Chunks without codes: {}", result.warning_count);
    if !result.skipped_files.is_empty() {
        let _ = writeln!(md, "- Skipped files: {}", result.skipped_files.len());
    }
    md.push('\n');

    if !result.insights.is_empty() {
        md.push_str("## Key Insights\n\n");
        for insight in &result.insights {
            let _ = writeln!(md, "- {}", insight);
        }
        md.push('\n');
    }

    if !result.top_findings.is_empty() {
        md.push_str("## Top Findings\n\n");
        md.push_str("| # | Cluster | Finding | Priority | Occurrences |\n");
        md.push_str("|---|---|---|---|---|\n");
        for (i, finding) in result.top_findings.iter().enumerate() {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} |",
                i + 1,
                finding.cluster_id,
                escape_cell(&finding_label(finding)),
                finding.priority,
                finding.occurrences
            );
        }
        md.push('\n');
    }

    for (cluster_id, hierarchy) in &result.codes {
        let _ = writeln!(md, "## {}\n", cluster_label(result, *cluster_id));
        if hierarchy.is_empty() {
            md.push_str("_No codes._\n\n");
            continue;
        }
        for theme in hierarchy.iter() {
            let _ = writeln!(
                md,
                "### {} [{}]\n",
                theme.canonical_name, theme.aggregate_priority
            );
            if let Some(description) = &theme.description {
                let _ = writeln!(md, "{}\n", description);
            }
            for quote in &theme.supporting_quotes {
                let _ = writeln!(md, "> \"{}\" ({}, chunk {})\n", quote.text, quote.speaker, quote.chunk_id);
            }
            for sub in &theme.sub_themes {
                let _ = write!(
                    md,
                    "- **{}** ({}, {} occurrences)",
                    sub.name, sub.priority, sub.occurrences
                );
                match &sub.description {
                    Some(d) => {
                        let _ = writeln!(md, ": {}", d);
                    }
                    None => md.push('\n'),
                }
                for quote in &sub.supporting_quotes {
                    let _ = writeln!(
                        md,
                        "  > \"{}\" ({}, chunk {})",
                        quote.text, quote.speaker, quote.chunk_id
                    );
                }
            }
            md.push('\n');
        }
    }

    if !result.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in &result.warnings {
            let _ = writeln!(md, "- chunk {}: {}", warning.chunk_id, warning.message);
        }
    }
    md
}

#[derive(Serialize)]
struct CsvRow<'a> {
    cluster_id: u32,
    participant_type: &'a str,
    theme: &'a str,
    theme_priority: Priority,
    sub_theme: &'a str,
    sub_theme_priority: Priority,
    occurrences: usize,
    quote: &'a str,
    speaker: &'a str,
    chunk_id: String,
}

pub fn render_csv(result: &AnalysisResult) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    let csv_error = |e: csv::Error| AnalysisError::Parse(format!("CSV export failed: {}", e));

    for (cluster_id, hierarchy) in &result.codes {
        let participant_type = result
            .source_file(*cluster_id)
            .map(|s| s.participant_type.as_str())
            .unwrap_or("unknown");
        for theme in hierarchy.iter() {
            let mut groups = vec![];
            if let Some(level) = theme.theme_level {
                groups.push(("", level.priority, level.occurrences, theme.supporting_quotes.first()));
            }
            for sub in &theme.sub_themes {
                groups.push((
                    sub.name.as_str(),
                    sub.priority,
                    sub.occurrences,
                    sub.supporting_quotes.first(),
                ));
            }
            for (sub_theme, priority, occurrences, quote) in groups {
                writer
                    .serialize(CsvRow {
                        cluster_id: *cluster_id,
                        participant_type,
                        theme: &theme.canonical_name,
                        theme_priority: theme.aggregate_priority,
                        sub_theme,
                        sub_theme_priority: priority,
                        occurrences,
                        quote: quote.map(|q| q.text.as_str()).unwrap_or(""),
                        speaker: quote.map(|q| q.speaker.as_str()).unwrap_or(""),
                        chunk_id: quote.map(|q| q.chunk_id.to_string()).unwrap_or_default(),
                    })
                    .map_err(csv_error)?;
            }
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AnalysisError::Parse(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AnalysisError::Parse(e.to_string()))
}

pub fn render_text(result: &AnalysisResult) -> String {
    let mut text = String::new();
    let rule = "=".repeat(60);
    let _ = writeln!(text, "{}\nQUALITATIVE ANALYSIS: {}\n{}", rule, result.project_name, rule);
    let _ = writeln!(text, "Generated: {}", result.timestamp.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(text, "Model: {}", result.model);
    let _ = writeln!(
        text,
        "Transcripts: {}  Chunks: {}  Warnings: {}\n",
        result.source_files.len(),
        result.chunk_info.total_chunks,
        result.warning_count
    );

    if !result.insights.is_empty() {
        text.push_str("KEY INSIGHTS\n");
        for (i, insight) in result.insights.iter().enumerate() {
            let _ = writeln!(text, "{}. {}", i + 1, insight);
        }
        text.push('\n');
    }
    if !result.top_findings.is_empty() {
        text.push_str("TOP FINDINGS\n");
        for (i, finding) in result.top_findings.iter().enumerate() {
            let _ = writeln!(
                text,
                "{}. [{}] {} (cluster {}, {} occurrences)",
                i + 1,
                finding.priority.as_str().to_uppercase(),
                finding_label(finding),
                finding.cluster_id,
                finding.occurrences
            );
        }
        text.push('\n');
    }
    for (cluster_id, hierarchy) in &result.codes {
        let _ = writeln!(text, "{}\n{}", cluster_label(result, *cluster_id), "-".repeat(40));
        for theme in hierarchy.iter() {
            let _ = writeln!(text, "* {} [{}]", theme.canonical_name, theme.aggregate_priority);
            for sub in &theme.sub_themes {
                let _ = writeln!(text, "    - {} [{}] x{}", sub.name, sub.priority, sub.occurrences);
            }
        }
        text.push('\n');
    }
    text
}

pub fn render_summary(result: &AnalysisResult) -> String {
    let analysis = &result.consolidated_analysis;
    let distribution = analysis.priority_distribution;
    let mut md = String::new();
    let _ = writeln!(md, "# Executive Summary: {}\n", result.project_name);

    md.push_str("## Key Statistics\n\n");
    let _ = writeln!(md, "- Transcripts: {}", result.source_files.len());
    let _ = writeln!(md, "- Themes identified: {}", analysis.total_themes);
    let _ = writeln!(md, "- Sub-themes identified: {}", analysis.total_sub_themes);
    let _ = writeln!(
        md,
        "- Priority distribution: {} high, {} medium, {} low",
        distribution.high, distribution.medium, distribution.low
    );
    let _ = writeln!(md, "- Themes shared across transcripts: {}\n", analysis.common_themes.len());

    if !result.insights.is_empty() {
        md.push_str("## Key Insights\n\n");
        for (i, insight) in result.insights.iter().enumerate() {
            let _ = writeln!(md, "{}. {}", i + 1, insight);
        }
        md.push('\n');
    }
    if !result.top_findings.is_empty() {
        md.push_str("## Top Findings\n\n");
        for (i, finding) in result.top_findings.iter().take(SUMMARY_FINDINGS).enumerate() {
            let _ = writeln!(
                md,
                "{}. **{}** ({} priority)",
                i + 1,
                finding_label(finding),
                finding.priority
            );
            if let Some(description) = &finding.description {
                let _ = writeln!(md, "   {}", description);
            }
            if let Some(quote) = &finding.quote {
                let _ = writeln!(md, "   > \"{}\" ({})", quote.text, quote.speaker);
            }
        }
    }
    md
}

#[derive(Debug, Serialize)]
struct VizNode {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<VizNode>,
}

impl From<&HierarchyNode> for VizNode {
    fn from(node: &HierarchyNode) -> Self {
        let children: Vec<VizNode> = node.children.iter().map(VizNode::from).collect();
        let value = match (children.is_empty(), node.priority) {
            (true, Some(p)) => Some(p.score()),
            _ => None,
        };
        Self {
            name: node.name.clone(),
            priority: node.priority,
            value,
            children,
        }
    }
}

/// Tree for visualization tools; leaves carry high=3, medium=2, low=1
pub fn render_hierarchy(result: &AnalysisResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(&VizNode::from(&result.code_hierarchy))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::RawCode;
    use crate::pipeline::{SourceFile, Warning, WarningKind};
    use crate::postprocess::{self, PostprocessConfig};
    use crate::text::chunking::{ChunkId, ChunkingStatistics};
    use crate::transcript::ParticipantType;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_result() -> AnalysisResult {
        let raw = BTreeMap::from([
            (
                1,
                vec![
                    RawCode::new(ChunkId::new(0, 0), 0, "Price Sensitivity")
                        .with_sub_theme("Too expensive")
                        .with_priority(Priority::High)
                        .with_quote("way too pricey | honestly", Some("P1")),
                    RawCode::new(ChunkId::new(0, 1), 0, "Fit").with_quote("runs small", Some("P2")),
                ],
            ),
            (2, vec![]),
        ]);
        let config = PostprocessConfig::default();
        let codes = postprocess::consolidate(&raw, &config);
        let summary = postprocess::summarize_all(&codes, &config);
        AnalysisResult {
            project_name: "jackets".to_string(),
            timestamp: chrono::Local
                .with_ymd_and_hms(2024, 3, 5, 7, 8, 9)
                .single()
                .unwrap(),
            model: "gpt-4o".to_string(),
            source_files: vec![
                SourceFile {
                    cluster_id: 1,
                    file_name: "BUYER_1.txt".to_string(),
                    participant_type: ParticipantType::Buyer,
                },
                SourceFile {
                    cluster_id: 2,
                    file_name: "notes.txt".to_string(),
                    participant_type: ParticipantType::Unknown,
                },
            ],
            original_texts: BTreeMap::new(),
            processed_texts: BTreeMap::new(),
            chunks: vec![],
            chunk_info: ChunkingStatistics::default(),
            consolidated_analysis: postprocess::consolidated_analysis(&codes),
            code_hierarchy: postprocess::code_hierarchy(&codes),
            cluster_summaries: BTreeMap::new(),
            top_findings: summary.top_findings,
            insights: summary.insights,
            codes,
            warnings: vec![Warning {
                chunk_id: ChunkId::new(0, 2),
                cluster_id: 1,
                kind: WarningKind::Parse,
                message: "unparseable model output".to_string(),
            }],
            warning_count: 1,
            skipped_files: vec![],
            vector_index: None,
        }
    }

    #[test]
    fn test_export_all_formats() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path());
        let written = exporter
            .export(&sample_result(), &ExportFormat::ALL)
            .unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "qualitative_analysis_20240305_070809.json",
                "qualitative_analysis_20240305_070809.md",
                "qualitative_analysis_20240305_070809_codes.csv",
                "qualitative_analysis_20240305_070809.txt",
                "qualitative_analysis_20240305_070809_summary.md",
                "qualitative_analysis_20240305_070809_hierarchy.json",
            ]
        );
        assert!(written.iter().all(|p| p.starts_with(dir.path().join("jackets"))));
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path().join("jackets")).unwrap().count(), 6);
    }

    #[test]
    fn test_json_always_written() {
        let dir = TempDir::new().unwrap();
        let written = Exporter::new(dir.path())
            .export(&sample_result(), &[ExportFormat::Csv])
            .unwrap();
        assert_eq!(written.len(), 2);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(json["project_name"], "jackets");
        assert_eq!(json["warning_count"], 1);
        assert!(json["codes"]["1"]["Price Sensitivity"].is_object());
        assert_eq!(json["codes"]["2"], serde_json::json!({}));
    }

    #[test]
    fn test_markdown() {
        let md = render_markdown(&sample_result());
        assert!(md.starts_with("# Qualitative Analysis: jackets"));
        assert!(md.contains("## Cluster 1: BUYER_1.txt (buyer)"));
        assert!(md.contains("### Price Sensitivity [high]"));
        assert!(md.contains("way too pricey | honestly"));
        assert!(md.contains("| 1 | 1 | Price Sensitivity / Too expensive | high | 1 |"));
        assert!(md.contains("## Cluster 2: notes.txt (unknown)\n\n_No codes._"));
        assert_eq!(escape_cell("a | b"), "a \\| b");
        assert!(md.contains("- chunk 0-2: unparseable model output"));
    }

    #[test]
    fn test_csv() {
        let csv = render_csv(&sample_result()).unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec![
                "cluster_id",
                "participant_type",
                "theme",
                "theme_priority",
                "sub_theme",
                "sub_theme_priority",
                "occurrences",
                "quote",
                "speaker",
                "chunk_id"
            ]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][2], "Price Sensitivity");
        assert_eq!(&rows[0][5], "high");
        assert_eq!(&rows[0][7], "way too pricey | honestly");
        assert_eq!(&rows[1][2], "Fit");
        assert_eq!(&rows[1][4], "");
        assert_eq!(&rows[1][9], "0-1");
    }

    #[test]
    fn test_summary_and_text() {
        let result = sample_result();
        let summary = render_summary(&result);
        assert!(summary.contains("- Priority distribution: 1 high, 0 medium, 0 low"));
        assert!(summary.contains("1. **Price Sensitivity / Too expensive** (high priority)"));

        let text = render_text(&result);
        assert!(text.contains("QUALITATIVE ANALYSIS: jackets"));
        assert!(text.contains("1. [HIGH] Price Sensitivity / Too expensive"));
    }

    #[test]
    fn test_hierarchy() {
        let json: serde_json::Value =
            serde_json::from_str(&render_hierarchy(&sample_result()).unwrap()).unwrap();
        assert_eq!(json["name"], "Qualitative Analysis");
        let price = &json["children"][0]["children"][0];
        assert_eq!(price["name"], "Price Sensitivity");
        assert_eq!(price["children"][0]["value"], 3);
        // a theme without sub-themes is a leaf
        assert_eq!(json["children"][0]["children"][1]["value"], 2);
    }
}
