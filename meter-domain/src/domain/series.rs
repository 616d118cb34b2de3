use time::{Duration, PrimitiveDateTime};

use super::Channel;

/// A point of a cumulative series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: PrimitiveDateTime,
    pub value: f64,
}

impl Sample {
    pub fn new(at: PrimitiveDateTime, value: f64) -> Self {
        Self { at, value }
    }
}

/// Cumulative register series for one channel, strictly ordered by time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSeries {
    channel: Channel,
    resolution: Duration,
    low_confidence: bool,
    samples: Vec<Sample>,
}

impl ReconciledSeries {
    /// Builds a series from samples already ordered by strictly increasing
    /// timestamp.
    pub fn new(channel: Channel, resolution: Duration, samples: Vec<Sample>, low_confidence: bool) -> Self {
        Self {
            channel,
            resolution,
            low_confidence,
            samples,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Finest step the series was observed at.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Set when no anchor backed the series and it counts up from zero.
    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Value observed exactly at `at`.
    pub fn value_at(&self, at: PrimitiveDateTime) -> Option<f64> {
        self.samples
            .binary_search_by(|s| s.at.cmp(&at))
            .ok()
            .map(|idx| self.samples[idx].value)
    }

    /// True when timestamps strictly increase and values never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.samples
            .windows(2)
            .all(|w| w[0].at < w[1].at && w[0].value <= w[1].value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn series() -> ReconciledSeries {
        ReconciledSeries::new(
            Channel::Import,
            Duration::hours(1),
            vec![
                Sample::new(datetime!(2025-06-15 00:00), 31441.37),
                Sample::new(datetime!(2025-06-15 01:00), 31442.11),
                Sample::new(datetime!(2025-06-15 02:00), 31442.58),
            ],
            false,
        )
    }

    #[test]
    fn value_at_requires_exact_timestamp() {
        let s = series();
        assert_eq!(s.value_at(datetime!(2025-06-15 01:00)), Some(31442.11));
        assert_eq!(s.value_at(datetime!(2025-06-15 01:30)), None);
    }

    #[test]
    fn monotonic_check_rejects_decrease() {
        assert!(series().is_monotonic());
        let bad = ReconciledSeries::new(
            Channel::Export,
            Duration::hours(1),
            vec![
                Sample::new(datetime!(2025-06-15 00:00), 10.0),
                Sample::new(datetime!(2025-06-15 01:00), 9.5),
            ],
            false,
        );
        assert!(!bad.is_monotonic());
    }
}
