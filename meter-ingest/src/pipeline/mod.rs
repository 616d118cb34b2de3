use std::collections::BTreeMap;

use meter_domain::domain::{Channel, Dataset, Resolution, SourceFormat, StatisticRecord};
use serde::Serialize;
use time::Duration;
use tracing::{info, warn};

use crate::{
    config::StatisticsConfig,
    sinks::StatisticsEmitter,
    sources::{Detection, FormatDetector, RawInput, SourceParser},
    transform::{ReconciliationWarning, Reconciler, ResolutionAggregator},
};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("unrecognized format: {0}")]
    UnrecognizedFormat(String),
    #[error("malformed {format} header: {reason}")]
    MalformedHeader { format: SourceFormat, reason: String },
    #[error("no data: {0}")]
    NoData(String),
    #[error("resolution {requested} is finer than the series step of {available:?}")]
    ResolutionTooFine { requested: Resolution, available: Duration },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid format override '{0}'")]
    InvalidOverride(String),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("render error: {0}")]
    Render(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse task failed: {0}")]
    Task(String),
}

/// Maps a user-supplied format name (`legacy`, `ap_am`, `180_280`, ...).
pub fn parse_override(raw: &str) -> Result<SourceFormat, PipelineError> {
    raw.parse().map_err(|_| PipelineError::InvalidOverride(raw.to_string()))
}

/// Outcome of one input file within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
    pub confidence: f64,
    /// Channels the file supplied readings for.
    pub channels: Vec<Channel>,
    pub data_rows: usize,
    pub summary_rows: usize,
    pub skipped_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn parsed(dataset: &Dataset) -> Self {
        let meta = dataset.metadata();
        Self {
            source: meta.source.clone(),
            format: Some(dataset.format()),
            confidence: meta.confidence,
            channels: dataset.channels().collect(),
            data_rows: meta.data_rows,
            summary_rows: meta.summary_rows,
            skipped_rows: meta.skipped_rows(),
            error: None,
        }
    }

    fn rejected(source: String, err: &PipelineError) -> Self {
        Self {
            source,
            format: None,
            confidence: 0.0,
            channels: Vec::new(),
            data_rows: 0,
            summary_rows: 0,
            skipped_rows: 0,
            error: Some(err.to_string()),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn rejected(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_rejected())
    }
}

/// Emitted statistics of one channel plus what reconciliation noticed.
#[derive(Debug, Clone)]
pub struct ChannelStatistics {
    pub channel: Channel,
    pub low_confidence: bool,
    pub records: Vec<StatisticRecord>,
    pub warnings: Vec<ReconciliationWarning>,
}

#[derive(Debug, Clone)]
pub struct StatisticsBatch {
    pub report: BatchReport,
    pub channels: BTreeMap<Channel, ChannelStatistics>,
}

impl StatisticsBatch {
    pub fn records(&self, channel: Channel) -> &[StatisticRecord] {
        self.channels
            .get(&channel)
            .map(|c| c.records.as_slice())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ReconciliationWarning> {
        self.channels.values().flat_map(|c| c.warnings.iter())
    }
}

/// detect -> parse per file, then reconcile -> aggregate -> emit per channel.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: StatisticsConfig,
    detector: FormatDetector,
    parser: SourceParser,
    reconciler: Reconciler,
    aggregator: ResolutionAggregator,
    emitter: StatisticsEmitter,
}

impl Pipeline {
    pub fn new(config: StatisticsConfig) -> Self {
        Self {
            detector: FormatDetector::default(),
            parser: SourceParser::new(config.parse_options()),
            reconciler: Reconciler::new(config.tolerance_kwh).with_range(config.range),
            aggregator: ResolutionAggregator::new(config.resolution),
            emitter: StatisticsEmitter::new(config.utc_offset, config.include_state, config.decimals),
            config,
        }
    }

    /// Classifies `input`, honouring `format_override`.
    pub fn detect(&self, input: &RawInput) -> Result<Detection, PipelineError> {
        self.detect_text(input, &input.text())
    }

    fn detect_text(&self, input: &RawInput, text: &str) -> Result<Detection, PipelineError> {
        match self.config.format_override {
            Some(format) => self.detector.confirm(&input.name, text, format),
            None => self.detector.detect(&input.name, text),
        }
    }

    pub fn parse(&self, input: &RawInput) -> Result<Dataset, PipelineError> {
        let text = input.text();
        let detection = self.detect_text(input, &text)?;
        self.parser.parse(input, &text, &detection)
    }

    /// Sequential batch run. A file that fails to detect or parse is
    /// reported and left out; the others are still reconciled.
    pub fn run(&self, inputs: &[RawInput]) -> Result<StatisticsBatch, PipelineError> {
        let parsed = inputs
            .iter()
            .map(|input| (input.name.clone(), self.parse(input)))
            .collect();
        self.finish(parsed)
    }

    /// Same as [`Pipeline::run`] with detection and parsing of each input
    /// on the blocking pool.
    pub async fn run_parallel(&self, inputs: Vec<RawInput>) -> Result<StatisticsBatch, PipelineError> {
        let tasks = inputs.into_iter().map(|input| {
            let pipeline = self.clone();
            tokio::task::spawn_blocking(move || {
                let parsed = pipeline.parse(&input);
                (input.name, parsed)
            })
        });

        let parsed = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.map_err(|e| PipelineError::Task(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        self.finish(parsed)
    }

    /// Reconciles, aggregates and emits every configured channel of
    /// already-parsed datasets. Channels without readings are left out;
    /// it is an error only when none has any.
    pub fn statistics(&self, datasets: &[Dataset]) -> Result<BTreeMap<Channel, ChannelStatistics>, PipelineError> {
        let mut channels = BTreeMap::new();
        for &channel in &self.config.channels {
            let reconciliation = match self.reconciler.reconcile_channel(datasets, channel) {
                Ok(r) => r,
                Err(PipelineError::NoData(reason)) => {
                    warn!(%channel, %reason, "channel skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let series = self.aggregator.aggregate(&reconciliation.series)?;
            let records = self.emitter.emit(&series)?;
            info!(
                %channel,
                records = records.len(),
                warnings = reconciliation.warnings.len(),
                low_confidence = series.low_confidence(),
                "channel statistics ready"
            );

            channels.insert(
                channel,
                ChannelStatistics {
                    channel,
                    low_confidence: series.low_confidence(),
                    records,
                    warnings: reconciliation.warnings,
                },
            );
        }

        if channels.is_empty() {
            return Err(PipelineError::NoData(format!(
                "none of {} datasets has readings for the configured channels",
                datasets.len()
            )));
        }
        Ok(channels)
    }

    fn finish(&self, parsed: Vec<(String, Result<Dataset, PipelineError>)>) -> Result<StatisticsBatch, PipelineError> {
        let mut report = BatchReport::default();
        let mut datasets = Vec::with_capacity(parsed.len());

        for (source, result) in parsed {
            match result {
                Ok(dataset) => {
                    if dataset.is_empty() {
                        warn!(%source, "file parsed but holds no readings");
                    }
                    report.files.push(FileReport::parsed(&dataset));
                    datasets.push(dataset);
                }
                Err(e) => {
                    warn!(%source, error = %e, "file rejected");
                    metrics::counter!("meter_files_rejected_total").increment(1);
                    report.files.push(FileReport::rejected(source, &e));
                }
            }
        }

        let channels = self.statistics(&datasets)?;
        Ok(StatisticsBatch { report, channels })
    }
}
