use meter_domain::domain::{ReconciledSeries, Resolution, Sample};
use time::{Duration, PrimitiveDateTime};
use tracing::debug;

use crate::pipeline::PipelineError;

/// Downsamples a cumulative series to end-of-bucket values.
///
/// Buckets are aligned to local midnight; bucket `b` covers `(b - step, b]`
/// and is kept, labelled `b`, only when the series has a sample exactly at
/// `b`. Nothing is averaged or interpolated.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionAggregator {
    resolution: Resolution,
}

impl ResolutionAggregator {
    pub fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }

    pub fn aggregate(&self, series: &ReconciledSeries) -> Result<ReconciledSeries, PipelineError> {
        let Some(step) = self.resolution.step() else {
            return Ok(series.clone());
        };
        if step < series.resolution() {
            return Err(PipelineError::ResolutionTooFine {
                requested: self.resolution,
                available: series.resolution(),
            });
        }

        let samples: Vec<Sample> = series
            .samples()
            .iter()
            .filter(|s| is_boundary(s.at, step))
            .copied()
            .collect();

        if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
            let spanned = ((last.at - first.at).whole_seconds() / step.whole_seconds()) as usize + 1;
            let partial = spanned - samples.len();
            if partial > 0 {
                debug!(channel = %series.channel(), partial, resolution = %self.resolution, "partial buckets dropped");
            }
        }

        Ok(ReconciledSeries::new(
            series.channel(),
            step,
            samples,
            series.low_confidence(),
        ))
    }
}

fn is_boundary(at: PrimitiveDateTime, step: Duration) -> bool {
    let since_midnight = at - at.date().midnight();
    since_midnight.whole_seconds() % step.whole_seconds() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_domain::domain::Channel;
    use time::macros::datetime;

    fn quarter_hour_series() -> ReconciledSeries {
        let start = datetime!(2025-06-14 23:00);
        let samples = (0..=8)
            .map(|i| Sample::new(start + Duration::minutes(15) * i, 100.0 + f64::from(i)))
            .collect();
        ReconciledSeries::new(Channel::Import, Duration::minutes(15), samples, false)
    }

    #[test]
    fn hourly_keeps_end_of_bucket_values() {
        let hourly = ResolutionAggregator::new(Resolution::Hourly)
            .aggregate(&quarter_hour_series())
            .unwrap();
        let got: Vec<(PrimitiveDateTime, f64)> = hourly.samples().iter().map(|s| (s.at, s.value)).collect();
        assert_eq!(
            got,
            vec![
                (datetime!(2025-06-14 23:00), 100.0),
                (datetime!(2025-06-15 00:00), 104.0),
                (datetime!(2025-06-15 01:00), 108.0),
            ]
        );
        assert_eq!(hourly.resolution(), Duration::HOUR);
    }

    #[test]
    fn daily_keeps_midnight_only() {
        let daily = ResolutionAggregator::new(Resolution::Daily)
            .aggregate(&quarter_hour_series())
            .unwrap();
        assert_eq!(daily.samples(), &[Sample::new(datetime!(2025-06-15 00:00), 104.0)]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let agg = ResolutionAggregator::new(Resolution::Hourly);
        let once = agg.aggregate(&quarter_hour_series()).unwrap();
        let twice = agg.aggregate(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn native_is_a_passthrough() {
        let series = quarter_hour_series();
        let out = ResolutionAggregator::new(Resolution::Native).aggregate(&series).unwrap();
        assert_eq!(out, series);
    }

    #[test]
    fn upsampling_is_refused() {
        let daily = ReconciledSeries::new(
            Channel::Export,
            Duration::DAY,
            vec![Sample::new(datetime!(2025-06-15 00:00), 1.0)],
            false,
        );
        let err = ResolutionAggregator::new(Resolution::Hourly).aggregate(&daily).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ResolutionTooFine {
                requested: Resolution::Hourly,
                ..
            }
        ));
    }
}
