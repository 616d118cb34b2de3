//! Statistic record emission and output rendering.

pub mod emitter;
pub mod json;
pub mod yaml;

pub use emitter::StatisticsEmitter;
pub use json::JsonSink;
pub use yaml::YamlSink;

use std::io::Write;

use crate::{
    config::OutputFormat,
    pipeline::{PipelineError, StatisticsBatch},
};

/// Renders a finished batch.
pub trait StatisticsSink {
    fn write(&self, batch: &StatisticsBatch, out: &mut dyn Write) -> Result<(), PipelineError>;
}

pub fn sink_for(format: OutputFormat) -> Box<dyn StatisticsSink + Send + Sync> {
    match format {
        OutputFormat::Json => Box::new(JsonSink),
        OutputFormat::Yaml => Box::new(YamlSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use meter_domain::domain::{Channel, StatisticRecord};
    use time::macros::datetime;

    use crate::pipeline::{BatchReport, ChannelStatistics};

    fn batch() -> StatisticsBatch {
        let records = vec![
            StatisticRecord {
                start: datetime!(2025-06-15 00:00 +2),
                sum: 31441.37,
                state: Some(31441.37),
            },
            StatisticRecord {
                start: datetime!(2025-06-15 01:00 +2),
                sum: 31442.11,
                state: None,
            },
        ];
        let mut channels = BTreeMap::new();
        channels.insert(
            Channel::Import,
            ChannelStatistics {
                channel: Channel::Import,
                low_confidence: false,
                records,
                warnings: Vec::new(),
            },
        );
        StatisticsBatch {
            report: BatchReport::default(),
            channels,
        }
    }

    #[test]
    fn json_document_is_keyed_by_channel() {
        let mut out = Vec::new();
        sink_for(OutputFormat::Json).write(&batch(), &mut out).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&out).unwrap();

        let import = doc["import"].as_array().unwrap();
        assert_eq!(import.len(), 2);
        assert_eq!(import[0]["start"], "2025-06-15T00:00:00+02:00");
        assert_eq!(import[0]["sum"], 31441.37);
        assert_eq!(import[0]["state"], 31441.37);
        assert!(import[1].get("state").is_none());
    }

    #[test]
    fn yaml_has_comment_header_and_channel_lists() {
        let mut out = Vec::new();
        sink_for(OutputFormat::Yaml).write(&batch(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("# import: 2 records\n"));
        let doc: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(doc["import"][1]["sum"].as_f64(), Some(31442.11));
    }
}
