use anyhow::{Context, Result};
use clap::Parser;
use meter_ingest::{config::AppConfig, observability, pipeline::Pipeline, sources::RawInput};
use serde_json::json;
use std::path::PathBuf;

/// Prints one JSON line per file with the detected format and row counts.
#[derive(Debug, Parser)]
#[command(name = "detect_format")]
struct Cli {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let cfg = AppConfig::load()?;
    let pipeline = Pipeline::new(cfg.statistics);

    for path in &cli.files {
        let source = path.display().to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {source}"))?;
        let input = RawInput::new(source.as_str(), bytes);

        let line = match pipeline.detect(&input).and_then(|d| pipeline.parse(&input).map(|ds| (d, ds))) {
            Ok((detection, dataset)) => {
                let meta = dataset.metadata();
                json!({
                    "source": source,
                    "format": detection.format,
                    "delimiter": (detection.delimiter as char).to_string(),
                    "confidence": detection.confidence,
                    "sampled_rows": detection.sampled_rows,
                    "channels": dataset.channels().collect::<Vec<_>>(),
                    "data_rows": meta.data_rows,
                    "summary_rows": meta.summary_rows,
                    "ignored_rows": meta.ignored_rows,
                    "skipped": meta.skipped,
                    "span": dataset.span().map(|(first, last)| [first.to_string(), last.to_string()]),
                })
            }
            Err(e) => json!({ "source": source, "error": e.to_string() }),
        };
        println!("{line}");
    }

    Ok(())
}
