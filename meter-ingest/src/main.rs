use anyhow::{Context, Result};
use clap::Parser;
use meter_domain::domain::{Resolution, SourceFormat};
use meter_ingest::{
    config::{AppConfig, OutputFormat},
    observability,
    pipeline::{parse_override, Pipeline},
    sinks::sink_for,
    sources::RawInput,
};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Converts utility meter exports into cumulative energy statistics.
///
/// Settings come from the file named by METER_STATISTICS_CONFIG (or
/// meter-statistics.toml); flags override it.
#[derive(Debug, Parser)]
#[command(name = "meter-statistics", version)]
struct Cli {
    /// Parse every file as this format: legacy, ap_am or 180_280.
    #[arg(long, value_parser = parse_override)]
    format: Option<SourceFormat>,

    /// native, 15min, hourly or daily.
    #[arg(long)]
    resolution: Option<Resolution>,

    #[arg(long, value_enum)]
    output: Option<OutputFormat>,

    /// Export files to combine.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cli = Cli::parse();
    let mut cfg = AppConfig::load()?;
    if let Some(format) = cli.format {
        cfg.statistics.format_override = Some(format);
    }
    if let Some(resolution) = cli.resolution {
        cfg.statistics.resolution = resolution;
    }
    if let Some(output) = cli.output {
        cfg.output.format = output;
    }

    let mut inputs = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        inputs.push(RawInput::new(path.display().to_string(), bytes));
    }

    let pipeline = Pipeline::new(cfg.statistics.clone());
    let batch = pipeline.run_parallel(inputs).await?;

    for warning in batch.warnings() {
        tracing::warn!("{warning}");
    }
    let rejected = batch.report.rejected().count();
    if rejected > 0 {
        tracing::warn!(rejected, files = batch.report.files.len(), "some files were not used");
    }

    let mut rendered = Vec::new();
    sink_for(cfg.output.format).write(&batch, &mut rendered)?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&rendered).await?;
    stdout.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_file_family_names() {
        let cli = Cli::try_parse_from([
            "meter-statistics",
            "--format",
            "180_280",
            "--resolution",
            "15min",
            "--output",
            "yaml",
            "a.csv",
            "b.csv",
        ])
        .unwrap();
        assert_eq!(cli.format, Some(SourceFormat::CumulativeAnchor));
        assert_eq!(cli.resolution, Some(Resolution::QuarterHour));
        assert_eq!(cli.output, Some(OutputFormat::Yaml));
        assert_eq!(cli.files.len(), 2);
    }

    #[test]
    fn unknown_format_and_missing_files_are_rejected() {
        assert!(Cli::try_parse_from(["meter-statistics", "--format", "xlsx", "a.csv"]).is_err());
        assert!(Cli::try_parse_from(["meter-statistics"]).is_err());
    }
}
