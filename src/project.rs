//! Project input tree: `inputs/<project>/{objectives,transcripts}`

use crate::error::{AnalysisError, Result};
use crate::text::chunking::ClusterId;
use crate::transcript::ParticipantType;
use crate::util::encoding::encode_to_utf8_raw;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const OBJECTIVES_DIR: &str = "objectives";
pub const TRANSCRIPTS_DIR: &str = "transcripts";

/// Background documents passed to the model with every chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// `objectives.json`, keyed by participant group
    pub objectives: Option<Value>,
    pub research_brief: Option<String>,
    pub brand_context: Option<Value>,
    pub competitor_analysis: Option<String>,
}

impl ProjectContext {
    pub fn is_empty(&self) -> bool {
        self.objectives.is_none()
            && self.research_brief.is_none()
            && self.brand_context.is_none()
            && self.competitor_analysis.is_none()
    }
}

/// One transcript file; each file is its own cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSource {
    pub cluster_id: ClusterId,
    pub file_name: String,
    pub participant_type: ParticipantType,
    pub raw_text: String,
}

impl TranscriptSource {
    pub fn new(cluster_id: ClusterId, file_name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let file_name = file_name.into();
        Self {
            cluster_id,
            participant_type: ParticipantType::from_file_name(&file_name),
            file_name,
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub sources: Vec<TranscriptSource>,
    pub context: ProjectContext,
    pub skipped_files: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct ProjectLoader {
    inputs_dir: PathBuf,
}

impl ProjectLoader {
    pub fn new(inputs_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs_dir: inputs_dir.into(),
        }
    }

    pub fn project_dir(&self, project_name: &str) -> PathBuf {
        self.inputs_dir.join(project_name)
    }

    pub fn load(&self, project_name: &str) -> Result<LoadedProject> {
        let project_dir = self.project_dir(project_name);
        if !project_dir.is_dir() {
            return Err(AnalysisError::ProjectNotFound(project_dir));
        }
        let context = load_context(&project_dir.join(OBJECTIVES_DIR));

        let transcripts_dir = project_dir.join(TRANSCRIPTS_DIR);
        let search_dir = if transcripts_dir.is_dir() {
            transcripts_dir
        } else {
            warn!(
                "{} has no {}/ directory, reading *.txt from the project root",
                project_dir.display(),
                TRANSCRIPTS_DIR
            );
            project_dir.clone()
        };

        let paths = text_files(&search_dir)?;
        if paths.is_empty() {
            return Err(AnalysisError::NoTranscripts(search_dir));
        }

        let mut sources = vec![];
        let mut skipped_files = vec![];
        for path in paths {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match read_text(&path) {
                Ok(raw_text) => {
                    let cluster_id = sources.len() as ClusterId + 1;
                    sources.push(TranscriptSource::new(cluster_id, file_name, raw_text));
                }
                Err(e) => {
                    warn!("skipping transcript {}: {}", path.display(), e);
                    skipped_files.push(SkippedFile {
                        file_name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if sources.is_empty() {
            return Err(AnalysisError::NoTranscripts(search_dir));
        }
        info!(
            "loaded {} transcripts for project {} ({} skipped)",
            sources.len(),
            project_name,
            skipped_files.len()
        );
        Ok(LoadedProject {
            sources,
            context,
            skipped_files,
        })
    }
}

/// `*.txt` files in `dir`, sorted by file name
fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| AnalysisError::io(dir, e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
    encode_to_utf8_raw(&bytes).map_err(|e| {
        AnalysisError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    })
}

fn read_optional_text(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match read_text(path) {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!("ignoring context file: {}", e);
            None
        }
    }
}

fn read_optional_json(path: &Path) -> Option<Value> {
    let text = read_optional_text(path)?;
    serde_json::from_str(&text)
        .inspect_err(|e| warn!("ignoring invalid JSON in {}: {}", path.display(), e))
        .ok()
}

fn load_context(objectives_dir: &Path) -> ProjectContext {
    if !objectives_dir.is_dir() {
        warn!("no objectives directory at {}", objectives_dir.display());
        return ProjectContext::default();
    }
    ProjectContext {
        objectives: read_optional_json(&objectives_dir.join("objectives.json")),
        research_brief: read_optional_text(&objectives_dir.join("research_brief.txt")),
        brand_context: read_optional_json(&objectives_dir.join("brand_context.json")),
        competitor_analysis: read_optional_text(&objectives_dir.join("competitor_analysis.txt")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_project() {
        let inputs = TempDir::new().unwrap();
        let project = inputs.path().join("jackets");
        write(
            &project.join("objectives/objectives.json"),
            br#"{"Buyers": {"Research Objectives": ["Why buy"]}}"#,
        );
        write(&project.join("objectives/research_brief.txt"), b"  The brief.  ");
        write(&project.join("objectives/brand_context.json"), b"not json");
        write(&project.join("transcripts/POTENTIAL_BUYER_2.txt"), b"P1: maybe later");
        write(&project.join("transcripts/BUYER_1.txt"), b"P1: I bought it");
        write(&project.join("transcripts/notes.md"), b"ignored");

        let loaded = ProjectLoader::new(inputs.path()).load("jackets").unwrap();
        let names: Vec<_> = loaded.sources.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["BUYER_1.txt", "POTENTIAL_BUYER_2.txt"]);
        assert_eq!(loaded.sources[0].cluster_id, 1);
        assert_eq!(loaded.sources[0].participant_type, ParticipantType::Buyer);
        assert_eq!(loaded.sources[1].cluster_id, 2);
        assert_eq!(loaded.sources[1].participant_type, ParticipantType::Potential);
        assert_eq!(loaded.sources[1].raw_text, "P1: maybe later");

        assert!(loaded.context.objectives.is_some());
        assert_eq!(loaded.context.research_brief.as_deref(), Some("The brief."));
        assert_eq!(loaded.context.brand_context, None);
        assert_eq!(loaded.context.competitor_analysis, None);
        assert!(loaded.skipped_files.is_empty());
    }

    #[test]
    fn test_root_fallback() {
        let inputs = TempDir::new().unwrap();
        write(&inputs.path().join("flat/session.txt"), b"Moderator: hi");
        let loaded = ProjectLoader::new(inputs.path()).load("flat").unwrap();
        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.sources[0].participant_type, ParticipantType::Unknown);
        assert!(loaded.context.is_empty());
    }

    #[test]
    fn test_missing_project() {
        let inputs = TempDir::new().unwrap();
        let err = ProjectLoader::new(inputs.path()).load("nope").unwrap_err();
        assert!(matches!(err, AnalysisError::ProjectNotFound(_)));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_no_transcripts() {
        let inputs = TempDir::new().unwrap();
        fs::create_dir_all(inputs.path().join("empty/transcripts")).unwrap();
        let err = ProjectLoader::new(inputs.path()).load("empty").unwrap_err();
        assert!(matches!(err, AnalysisError::NoTranscripts(_)));
    }
}
