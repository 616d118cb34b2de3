use std::collections::BTreeMap;

use time::PrimitiveDateTime;

use super::{Channel, Reading, SourceFormat};

/// A row a parser could not turn into readings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SkippedRow {
    /// 1-based line number in the source file.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DatasetMetadata {
    /// Caller-supplied name of the input, usually the file name.
    pub source: String,
    /// Detection confidence in `[0, 1]`; `1.0` when the format was forced.
    pub confidence: f64,
    /// Non-blank rows below the header.
    pub total_rows: usize,
    /// Rows that produced at least one reading.
    pub data_rows: usize,
    /// Maximum/total footer rows.
    pub summary_rows: usize,
    /// Well-formed rows for variables outside the dictionary.
    pub ignored_rows: usize,
    pub skipped: Vec<SkippedRow>,
}

impl DatasetMetadata {
    pub fn skipped_rows(&self) -> usize {
        self.skipped.len()
    }
}

/// Output of one parser run. Immutable once built.
#[derive(Debug, Clone)]
pub struct Dataset {
    format: SourceFormat,
    fingerprint: String,
    readings: BTreeMap<Channel, Vec<Reading>>,
    metadata: DatasetMetadata,
}

impl Dataset {
    /// Partitions `readings` by channel and orders each partition by
    /// timestamp (deltas before anchors at equal timestamps).
    pub fn new(
        format: SourceFormat,
        fingerprint: impl Into<String>,
        readings: Vec<Reading>,
        metadata: DatasetMetadata,
    ) -> Self {
        let mut by_channel: BTreeMap<Channel, Vec<Reading>> = BTreeMap::new();
        for r in readings {
            by_channel.entry(r.channel).or_default().push(r);
        }
        for list in by_channel.values_mut() {
            list.sort_by(|a, b| a.at.cmp(&b.at).then(a.kind_rank().cmp(&b.kind_rank())));
        }

        Self {
            format,
            fingerprint: fingerprint.into(),
            readings: by_channel,
            metadata,
        }
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// Content hash of the raw input; breaks ties between same-format
    /// datasets independent of the order they were supplied in.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn readings(&self, channel: Channel) -> &[Reading] {
        self.readings.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.readings
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(c, _)| *c)
    }

    pub fn reading_count(&self) -> usize {
        self.readings.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.reading_count() == 0
    }

    /// Earliest and latest reading timestamp across all channels.
    pub fn span(&self) -> Option<(PrimitiveDateTime, PrimitiveDateTime)> {
        let first = self.readings.values().filter_map(|l| l.first()).map(|r| r.at).min()?;
        let last = self.readings.values().filter_map(|l| l.last()).map(|r| r.at).max()?;
        Some((first, last))
    }
}
