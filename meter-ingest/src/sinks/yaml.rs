use std::{collections::BTreeMap, io::Write};

use meter_domain::domain::{Channel, StatisticRecord};

use super::StatisticsSink;
use crate::pipeline::{PipelineError, StatisticsBatch};

/// Per-channel record lists in the layout the statistics import YAML
/// files use, preceded by a comment line per channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSink;

impl StatisticsSink for YamlSink {
    fn write(&self, batch: &StatisticsBatch, out: &mut dyn Write) -> Result<(), PipelineError> {
        for (channel, stats) in &batch.channels {
            let note = if stats.low_confidence { ", low confidence" } else { "" };
            writeln!(out, "# {channel}: {} records{note}", stats.records.len())?;
        }

        let doc: BTreeMap<Channel, &[StatisticRecord]> = batch
            .channels
            .iter()
            .map(|(channel, stats)| (*channel, stats.records.as_slice()))
            .collect();
        serde_yaml::to_writer(&mut *out, &doc).map_err(|e| PipelineError::Render(e.to_string()))
    }
}
