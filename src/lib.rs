pub mod coding;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod postprocess;
pub mod project;
pub mod text;
pub mod transcript;
pub mod util;
pub mod vector;

pub use config::AppConfig;
pub use error::{AnalysisError, Result};
pub use export::{ExportFormat, Exporter};
pub use pipeline::{AnalysisResult, Analyzer, AnalyzerConfig};
