use std::{collections::BTreeMap, io::Write};

use meter_domain::domain::{Channel, StatisticRecord};

use super::StatisticsSink;
use crate::pipeline::{PipelineError, StatisticsBatch};

/// One pretty-printed document: `{ "import": [...], "export": [...] }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSink;

impl StatisticsSink for JsonSink {
    fn write(&self, batch: &StatisticsBatch, out: &mut dyn Write) -> Result<(), PipelineError> {
        let doc: BTreeMap<Channel, &[StatisticRecord]> = batch
            .channels
            .iter()
            .map(|(channel, stats)| (*channel, stats.records.as_slice()))
            .collect();
        serde_json::to_writer_pretty(&mut *out, &doc).map_err(|e| PipelineError::Render(e.to_string()))?;
        writeln!(out)?;
        Ok(())
    }
}
