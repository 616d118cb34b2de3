use meter_domain::domain::{ReconciledSeries, StatisticRecord};
use time::UtcOffset;

use crate::pipeline::PipelineError;

/// Stamps an aggregated series with its UTC offset and rounds it into
/// statistic records, re-checking ordering and monotonicity on the way out.
#[derive(Debug, Clone)]
pub struct StatisticsEmitter {
    offset: UtcOffset,
    include_state: bool,
    decimals: u32,
}

impl StatisticsEmitter {
    pub fn new(offset: UtcOffset, include_state: bool, decimals: u32) -> Self {
        Self {
            offset,
            include_state,
            decimals,
        }
    }

    pub fn emit(&self, series: &ReconciledSeries) -> Result<Vec<StatisticRecord>, PipelineError> {
        let scale = 10f64.powi(self.decimals.min(12) as i32);
        let mut records: Vec<StatisticRecord> = Vec::with_capacity(series.len());

        for sample in series.samples() {
            let start = sample.at.assume_offset(self.offset);
            let sum = (sample.value * scale).round() / scale;

            if let Some(prev) = records.last() {
                if start <= prev.start {
                    return Err(PipelineError::InvariantViolation(format!(
                        "{} records out of order: {} after {}",
                        series.channel(),
                        start,
                        prev.start
                    )));
                }
                if sum < prev.sum {
                    return Err(PipelineError::InvariantViolation(format!(
                        "{} sum decreases from {} to {} at {}",
                        series.channel(),
                        prev.sum,
                        sum,
                        start
                    )));
                }
            }

            records.push(StatisticRecord {
                start,
                sum,
                state: self.include_state.then_some(sum),
            });
        }

        let counter = metrics::counter!("statistics_records_emitted_total");
        counter.increment(records.len() as u64);

        Ok(records)
    }
}
