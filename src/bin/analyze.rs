use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use transcript_coder::util::shutdown::create_lock_and_wait;
use transcript_coder::util::tracing as logging;
use transcript_coder::{AnalysisError, Analyzer, AppConfig, ExportFormat, Exporter};

#[derive(Parser, Debug)]
#[command(
    name = "analyze",
    about = "Code interview transcripts into consolidated qualitative themes"
)]
struct AnalyzeCli {
    /// Project directory name under the inputs directory
    project_name: String,

    /// Root directory holding `<project>/objectives` and `<project>/transcripts`
    #[arg(long, default_value = "inputs")]
    inputs_dir: PathBuf,

    /// Results are written to `<outputs-dir>/<project>/`
    #[arg(long, default_value = "outputs")]
    outputs_dir: PathBuf,

    /// Export formats (JSON is always written)
    #[arg(long = "format", value_enum, default_values_t = vec![FormatArg::All])]
    formats: Vec<FormatArg>,

    /// Print the chunks nearest to this query after the run (needs HUGGING_FACE_TOKEN)
    #[arg(long)]
    similar: Option<String>,

    #[arg(long, default_value_t = 5)]
    top_k: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Json,
    Markdown,
    Csv,
    Text,
    Summary,
    Hierarchy,
    All,
}

impl FormatArg {
    fn expand(args: &[FormatArg]) -> Vec<ExportFormat> {
        let mut formats: Vec<ExportFormat> = args
            .iter()
            .flat_map(|arg| match arg {
                FormatArg::Json => vec![ExportFormat::Json],
                FormatArg::Markdown => vec![ExportFormat::Markdown],
                FormatArg::Csv => vec![ExportFormat::Csv],
                FormatArg::Text => vec![ExportFormat::Text],
                FormatArg::Summary => vec![ExportFormat::Summary],
                FormatArg::Hierarchy => vec![ExportFormat::Hierarchy],
                FormatArg::All => ExportFormat::ALL.to_vec(),
            })
            .collect();
        formats.sort();
        formats.dedup();
        formats
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = AnalyzeCli::parse();
    if let Err(e) = logging::init_logging("transcript_coder", "logs") {
        eprintln!("logging disabled: {:?}", e);
    }
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            let code = e
                .downcast_ref::<AnalysisError>()
                .map(AnalysisError::exit_code)
                .unwrap_or(1);
            tracing::error!("analysis failed: {:?}", e);
            eprintln!("error: {:#}", e);
            code
        }
    };
    logging::shutdown();
    ExitCode::from(code as u8)
}

async fn run(cli: AnalyzeCli) -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!("configuration: {:?}", config);

    let analyzer = Analyzer::new(
        config.analyzer_config(&cli.inputs_dir),
        config.code_generator()?,
        config.embedder()?,
    )?;

    let (lock, mut wait) = create_lock_and_wait();
    let ctrl_c = lock.release_on_ctrl_c();
    let result = analyzer.analyze_project(&cli.project_name, &mut wait).await;
    ctrl_c.abort();
    let result = result?;

    let exporter = Exporter::new(&cli.outputs_dir);
    let written = exporter
        .export(&result, &FormatArg::expand(&cli.formats))
        .with_context(|| format!("exporting results for {}", cli.project_name))?;

    println!(
        "Analyzed {} transcript(s): {} chunk(s), {} theme(s), {} warning(s)",
        result.source_files.len(),
        result.chunks.len(),
        result.consolidated_analysis.total_themes,
        result.warning_count
    );
    for skipped in &result.skipped_files {
        println!("  skipped {}: {}", skipped.file_name, skipped.reason);
    }
    for path in &written {
        println!("  wrote {}", path.display());
    }

    if let Some(query) = cli.similar.as_deref() {
        let hits = analyzer.search_similar(query, cli.top_k).await?;
        if hits.is_empty() {
            println!("No similar chunks (embeddings disabled or index empty)");
        }
        for (chunk_id, score) in hits {
            let text = result
                .chunks
                .iter()
                .find(|c| c.id == chunk_id)
                .map(|c| c.text.as_str())
                .unwrap_or_default();
            println!("  [{}] {:.3} {}", chunk_id, score, text);
        }
    }
    Ok(())
}
