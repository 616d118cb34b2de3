//! Raw input handling, format detection and the per-format parsers.

pub mod cells;
pub mod cumulative_anchor;
pub mod detector;
pub mod interval_delta;
pub mod legacy;
pub mod raw;

pub use detector::{Detection, FormatDetector, Signature};
pub use raw::{RawInput, RawRow, RawTable};

use meter_domain::domain::{Dataset, DatasetMetadata, Reading, SkippedRow, SourceFormat};
use tracing::{debug, info};

use crate::{config::VariableNames, pipeline::PipelineError};

/// Parser settings taken from [`crate::config::StatisticsConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    pub variables: VariableNames,
    pub max_delta_kwh: f64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            variables: VariableNames::default(),
            max_delta_kwh: 50.0,
        }
    }
}

impl ParseOptions {
    pub(crate) fn check_delta(&self, value: f64) -> Result<f64, String> {
        if value < 0.0 {
            Err(format!("negative delta {value}"))
        } else if value > self.max_delta_kwh {
            Err(format!("delta {value} exceeds {} kWh", self.max_delta_kwh))
        } else {
            Ok(value)
        }
    }

    pub(crate) fn check_anchor(&self, value: f64) -> Result<f64, String> {
        if value < 0.0 {
            Err(format!("negative register value {value}"))
        } else {
            Ok(value)
        }
    }
}

/// Row bookkeeping a parser fills in while walking a table.
#[derive(Debug)]
pub(crate) struct RowTally {
    format: SourceFormat,
    total: usize,
    data: usize,
    summary: usize,
    ignored: usize,
    skipped: Vec<SkippedRow>,
}

impl RowTally {
    pub(crate) fn new(format: SourceFormat, table: &RawTable) -> Self {
        let mut tally = Self {
            format,
            total: table.rows.len() + table.unreadable.len(),
            data: 0,
            summary: 0,
            ignored: 0,
            skipped: Vec::new(),
        };
        for row in &table.unreadable {
            tally.skip(row.line, row.reason.clone());
        }
        tally
    }

    pub(crate) fn data(&mut self) {
        self.data += 1;
    }

    pub(crate) fn ignored(&mut self) {
        self.ignored += 1;
    }

    pub(crate) fn summary(&mut self, line: usize) {
        debug!(format = %self.format, line, "summary row excluded");
        metrics::counter!("meter_summary_rows_total").increment(1);
        self.summary += 1;
    }

    pub(crate) fn skip(&mut self, line: usize, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(format = %self.format, line, %reason, "skipping malformed row");
        metrics::counter!("meter_rows_skipped_total", "format" => self.format.as_str()).increment(1);
        self.skipped.push(SkippedRow { line, reason });
    }

    fn into_metadata(self, source: &str, confidence: f64) -> DatasetMetadata {
        DatasetMetadata {
            source: source.to_string(),
            confidence,
            total_rows: self.total,
            data_rows: self.data,
            summary_rows: self.summary,
            ignored_rows: self.ignored,
            skipped: self.skipped,
        }
    }
}

/// Cell at `idx`, or the reason the row is short.
pub(crate) fn cell<'a>(row: &'a RawRow, idx: usize) -> Result<&'a str, String> {
    row.cell(idx).ok_or_else(|| format!("missing column {}", idx + 1))
}

/// Rejects rows whose cell count differs from the header's.
pub(crate) fn check_width(row: &RawRow, expected: usize) -> Result<(), String> {
    match row.width() {
        w if w == expected => Ok(()),
        w => Err(format!("expected {expected} cells, found {w}")),
    }
}

pub(crate) fn number(row: &RawRow, idx: usize) -> Result<f64, String> {
    let raw = cell(row, idx)?;
    cells::parse_number(raw).ok_or_else(|| format!("unparsable number '{raw}'"))
}

/// Dispatches a detected input to its format's parser.
#[derive(Debug, Clone, Default)]
pub struct SourceParser {
    options: ParseOptions,
}

impl SourceParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Parses `text` (the decoded `input`) as `detection.format`.
    pub fn parse(&self, input: &RawInput, text: &str, detection: &Detection) -> Result<Dataset, PipelineError> {
        let table = RawTable::read(text, detection.delimiter)?;
        let (readings, tally): (Vec<Reading>, RowTally) = match detection.format {
            SourceFormat::Legacy => legacy::parse(&table, &self.options)?,
            SourceFormat::IntervalDelta => interval_delta::parse(&table, &self.options)?,
            SourceFormat::CumulativeAnchor => cumulative_anchor::parse(&table, &self.options)?,
        };
        let metadata = tally.into_metadata(&input.name, detection.confidence);
        let dataset = Dataset::new(detection.format, input.fingerprint(), readings, metadata);

        info!(
            source = %input.name,
            format = %detection.format,
            readings = dataset.reading_count(),
            rows = dataset.metadata().data_rows,
            skipped = dataset.metadata().skipped_rows(),
            "dataset parsed"
        );

        Ok(dataset)
    }
}
