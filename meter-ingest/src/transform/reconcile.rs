//! Merges anchors and deltas from any number of datasets into one monotonic
//! cumulative series per channel.
//!
//! Conflicts between sources are settled by format priority
//! (interval delta > cumulative anchor > legacy), then by content
//! fingerprint, so the result never depends on input order. Anchors are
//! ground truth: every anchor the series reaches replaces the running
//! estimate, and earlier samples are never redistributed.

use std::{
    cmp::{Ordering, Reverse},
    collections::BTreeMap,
    fmt,
};

use meter_domain::domain::{Channel, Dataset, ReconciledSeries, Reading, Sample};
use time::{Duration, PrimitiveDateTime};
use tracing::{debug, warn};

use crate::{config::DateRange, pipeline::PipelineError};

/// Absolute slack when comparing register values for regressions.
const REGISTER_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationWarning {
    /// The deltas of a window disagree with its closing anchor by more than
    /// the tolerance. The series was snapped to the anchor.
    Drift {
        channel: Channel,
        window_start: PrimitiveDateTime,
        window_end: PrimitiveDateTime,
        expected: f64,
        anchor: f64,
        /// `anchor - expected`.
        magnitude: f64,
        /// False when the window's deltas do not tile it without gaps.
        complete: bool,
    },
    /// An anchor below the previous accepted anchor; it was discarded.
    AnchorRegression {
        channel: Channel,
        at: PrimitiveDateTime,
        value: f64,
        previous: f64,
    },
    /// The series counts up from zero.
    NoAnchors { channel: Channel },
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drift {
                channel,
                window_start,
                window_end,
                expected,
                anchor,
                magnitude,
                complete,
            } => {
                write!(
                    f,
                    "{channel}: drift of {magnitude:+.3} kWh in ({window_start}, {window_end}] \
                     (deltas gave {expected:.3}, anchor {anchor:.3})"
                )?;
                if !complete {
                    write!(f, ", window has gaps")?;
                }
                Ok(())
            }
            Self::AnchorRegression {
                channel,
                at,
                value,
                previous,
            } => write!(f, "{channel}: anchor {value:.3} at {at} is below previous {previous:.3}, ignored"),
            Self::NoAnchors { channel } => write!(f, "{channel}: no anchor readings, series starts at zero"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub series: ReconciledSeries,
    pub warnings: Vec<ReconciliationWarning>,
}

/// A reading together with the rank of the dataset it came from.
#[derive(Debug, Clone, Copy)]
struct Ranked<'a> {
    reading: Reading,
    priority: u8,
    fingerprint: &'a str,
}

impl Ranked<'_> {
    /// `Less` when `self` should win a conflict against `other`.
    fn precedence(&self, other: &Self) -> Ordering {
        Reverse(self.priority)
            .cmp(&Reverse(other.priority))
            .then_with(|| self.fingerprint.cmp(other.fingerprint))
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    tolerance: f64,
    range: Option<DateRange>,
}

impl Reconciler {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            range: None,
        }
    }

    pub fn with_range(mut self, range: Option<DateRange>) -> Self {
        self.range = range;
        self
    }

    pub fn reconcile_channel(&self, datasets: &[Dataset], channel: Channel) -> Result<Reconciliation, PipelineError> {
        let (anchors, deltas) = self.select(datasets, channel)?;
        let mut warnings = Vec::new();

        let resolution = series_resolution(&anchors, &deltas);
        let low_confidence = anchors.is_empty();
        if low_confidence {
            warn!(%channel, "no anchors, series counts up from zero");
            warnings.push(ReconciliationWarning::NoAnchors { channel });
        }

        let mut samples: BTreeMap<PrimitiveDateTime, f64> = BTreeMap::new();
        let first_anchor = anchors.first().copied();

        // Deltas up to the first anchor hang off it backwards; with no
        // anchor they count up from zero.
        let split = match first_anchor {
            Some(a) => deltas.partition_point(|d| d.at <= a.at),
            None => deltas.len(),
        };
        let (leading, trailing) = deltas.split_at(split);
        if let Some(first) = leading.first() {
            let total: f64 = leading.iter().map(|d| d.value).sum();
            let mut value = first_anchor.map_or(0.0, |a| a.value - total);
            samples.insert(first.start(), value);
            for d in leading {
                value += d.value;
                samples.insert(d.at, value);
            }
        }

        if let Some(first) = first_anchor {
            samples.insert(first.at, first.value);
            self.walk(channel, first, &anchors[1..], trailing, &mut samples, &mut warnings);
        }

        // Back-derived opening samples may fall before the range start.
        if let Some(range) = self.range {
            samples.retain(|at, _| range.contains(*at));
        }

        let samples: Vec<Sample> = samples.into_iter().map(|(at, value)| Sample::new(at, value)).collect();
        debug!(%channel, samples = samples.len(), anchors = anchors.len(), deltas = deltas.len(), "channel reconciled");

        Ok(Reconciliation {
            series: ReconciledSeries::new(channel, resolution, samples, low_confidence),
            warnings,
        })
    }

    /// Range-filtered, conflict-free anchors and deltas of `channel`, each
    /// sorted by timestamp.
    fn select(&self, datasets: &[Dataset], channel: Channel) -> Result<(Vec<Reading>, Vec<Reading>), PipelineError> {
        let mut candidates: Vec<Ranked<'_>> = datasets
            .iter()
            .flat_map(|ds| {
                let priority = ds.format().priority();
                let fingerprint = ds.fingerprint();
                ds.readings(channel).iter().map(move |r| Ranked {
                    reading: *r,
                    priority,
                    fingerprint,
                })
            })
            .filter(|c| self.range.map_or(true, |range| range.contains(c.reading.at)))
            .collect();

        if candidates.is_empty() {
            return Err(PipelineError::NoData(format!("{channel} channel has no readings")));
        }

        candidates.sort_by(|a, b| a.precedence(b).then_with(|| a.reading.at.cmp(&b.reading.at)));

        let mut anchors: BTreeMap<PrimitiveDateTime, Reading> = BTreeMap::new();
        // start -> end of every accepted delta interval; never overlapping.
        let mut covered: BTreeMap<PrimitiveDateTime, (PrimitiveDateTime, Reading)> = BTreeMap::new();
        let mut dropped = 0u64;

        for c in &candidates {
            let r = c.reading;
            if r.is_anchor() {
                if anchors.contains_key(&r.at) {
                    dropped += 1;
                } else {
                    anchors.insert(r.at, r);
                }
                continue;
            }

            let (start, end) = (r.start(), r.at);
            let overlaps = covered
                .range(..end)
                .next_back()
                .is_some_and(|(_, (prev_end, _))| *prev_end > start);
            if overlaps {
                dropped += 1;
            } else {
                covered.insert(start, (end, r));
            }
        }

        if dropped > 0 {
            debug!(%channel, dropped, "duplicate readings dropped");
            metrics::counter!("reconcile_duplicates_dropped_total").increment(dropped);
        }

        let anchors = anchors.into_values().collect();
        let deltas = covered.into_values().map(|(_, r)| r).collect();
        Ok((anchors, deltas))
    }

    /// Walks everything after the first anchor in time order, deltas before
    /// an anchor at the same instant.
    fn walk(
        &self,
        channel: Channel,
        first: Reading,
        anchors: &[Reading],
        deltas: &[Reading],
        samples: &mut BTreeMap<PrimitiveDateTime, f64>,
        warnings: &mut Vec<ReconciliationWarning>,
    ) {
        let mut last_anchor = first;
        let mut running = first.value;
        let mut window: Vec<PrimitiveDateTime> = Vec::new();
        let mut contiguous = true;
        let mut cursor = first.at;

        let mut deltas = deltas.iter().peekable();
        let mut anchors = anchors.iter().peekable();

        loop {
            let take_delta = match (deltas.peek(), anchors.peek()) {
                (Some(d), Some(a)) => d.at <= a.at,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };

            if take_delta {
                let Some(d) = deltas.next() else { break };
                contiguous &= d.start() == cursor;
                cursor = d.at;
                running += d.value;
                samples.insert(d.at, running);
                window.push(d.at);
                continue;
            }

            let Some(&anchor) = anchors.next() else { break };
            if anchor.value + REGISTER_EPSILON < last_anchor.value {
                warn!(%channel, at = %anchor.at, value = anchor.value, previous = last_anchor.value, "anchor regression ignored");
                warnings.push(ReconciliationWarning::AnchorRegression {
                    channel,
                    at: anchor.at,
                    value: anchor.value,
                    previous: last_anchor.value,
                });
                continue;
            }

            if !window.is_empty() {
                contiguous &= cursor == anchor.at;
                self.check_window(channel, last_anchor, anchor, running, contiguous, warnings);
                if running > anchor.value {
                    for at in &window {
                        if let Some(v) = samples.get_mut(at) {
                            *v = v.min(anchor.value);
                        }
                    }
                }
            }

            samples.insert(anchor.at, anchor.value);
            running = anchor.value;
            last_anchor = anchor;
            window.clear();
            contiguous = true;
            cursor = anchor.at;
        }
    }

    fn check_window(
        &self,
        channel: Channel,
        opening: Reading,
        closing: Reading,
        expected: f64,
        complete: bool,
        warnings: &mut Vec<ReconciliationWarning>,
    ) {
        let magnitude = closing.value - expected;
        if magnitude.abs() <= self.tolerance {
            return;
        }

        warn!(
            %channel,
            window_start = %opening.at,
            window_end = %closing.at,
            expected,
            anchor = closing.value,
            magnitude,
            complete,
            "reconciliation drift, snapping to anchor"
        );
        metrics::counter!("reconcile_drift_warnings_total").increment(1);
        warnings.push(ReconciliationWarning::Drift {
            channel,
            window_start: opening.at,
            window_end: closing.at,
            expected,
            anchor: closing.value,
            magnitude,
            complete,
        });
    }
}

/// Smallest delta interval, else smallest anchor spacing, else one day.
fn series_resolution(anchors: &[Reading], deltas: &[Reading]) -> Duration {
    deltas
        .iter()
        .filter_map(Reading::interval)
        .min()
        .or_else(|| anchors.windows(2).map(|w| w[1].at - w[0].at).min())
        .unwrap_or(Duration::DAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_domain::domain::{DatasetMetadata, SourceFormat};
    use time::macros::{date, datetime};

    const QH: Duration = Duration::minutes(15);

    fn dataset(format: SourceFormat, fingerprint: &str, readings: Vec<Reading>) -> Dataset {
        Dataset::new(format, fingerprint, readings, DatasetMetadata::default())
    }

    /// Quarter-hour deltas starting at `from`, one per value.
    fn quarter_hours(from: PrimitiveDateTime, values: &[f64]) -> Vec<Reading> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Reading::delta(Channel::Import, from + QH * (i as i32 + 1), QH, *v))
            .collect()
    }

    fn anchor(at: PrimitiveDateTime, value: f64) -> Reading {
        Reading::anchor(Channel::Import, at, value)
    }

    #[test]
    fn closing_anchor_is_reproduced_exactly() {
        // 96 quarter hours: 95 x 0.08 + 0.157 = 7.757 kWh.
        let mut values = vec![0.08; 95];
        values.push(0.157);
        let mut readings = quarter_hours(datetime!(2025-06-14 00:00), &values);
        readings.push(anchor(datetime!(2025-06-14 00:00), 31433.803));
        readings.push(anchor(datetime!(2025-06-15 00:00), 31441.56));

        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::Legacy, "a", readings)], Channel::Import)
            .unwrap();

        assert!(out.warnings.is_empty());
        assert_eq!(out.series.value_at(datetime!(2025-06-15 00:00)), Some(31441.56));
        assert_eq!(out.series.value_at(datetime!(2025-06-14 00:00)), Some(31433.803));
        assert_eq!(out.series.len(), 97);
        assert!(out.series.is_monotonic());
        assert_eq!(out.series.resolution(), QH);
    }

    #[test]
    fn drift_beyond_tolerance_snaps_and_warns() {
        let mut readings = quarter_hours(datetime!(2025-06-14 00:00), &[1.0, 1.0]);
        readings.push(anchor(datetime!(2025-06-14 00:00), 100.0));
        readings.push(anchor(datetime!(2025-06-14 00:30), 102.5));

        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::Legacy, "a", readings)], Channel::Import)
            .unwrap();

        assert_eq!(out.series.value_at(datetime!(2025-06-14 00:15)), Some(101.0));
        assert_eq!(out.series.value_at(datetime!(2025-06-14 00:30)), Some(102.5));
        match &out.warnings[..] {
            [ReconciliationWarning::Drift {
                magnitude, complete, ..
            }] => {
                assert!((magnitude - 0.5).abs() < 1e-9);
                assert!(*complete);
            }
            other => panic!("unexpected warnings {other:?}"),
        }
    }

    #[test]
    fn overshooting_window_is_capped_at_anchor() {
        let mut readings = quarter_hours(datetime!(2025-06-14 00:00), &[1.0, 1.0, 1.0]);
        readings.push(anchor(datetime!(2025-06-14 00:00), 100.0));
        readings.push(anchor(datetime!(2025-06-14 00:45), 101.5));

        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::Legacy, "a", readings)], Channel::Import)
            .unwrap();

        let values: Vec<f64> = out.series.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![100.0, 101.0, 101.5, 101.5]);
        assert!(out.series.is_monotonic());
    }

    #[test]
    fn interval_delta_wins_over_legacy_for_the_same_interval() {
        let legacy = dataset(
            SourceFormat::Legacy,
            "legacy",
            vec![
                anchor(datetime!(2025-06-14 00:00), 10.0),
                Reading::delta(Channel::Import, datetime!(2025-06-14 01:00), Duration::HOUR, 0.9),
            ],
        );
        let interval = dataset(
            SourceFormat::IntervalDelta,
            "interval",
            quarter_hours(datetime!(2025-06-14 00:00), &[0.2, 0.2, 0.2, 0.2]),
        );

        for inputs in [[legacy.clone(), interval.clone()], [interval, legacy]] {
            let out = Reconciler::new(0.05).reconcile_channel(&inputs, Channel::Import).unwrap();
            let at_quarter = out.series.value_at(datetime!(2025-06-14 00:15)).unwrap();
            assert!((at_quarter - 10.2).abs() < 1e-9);
            let at_one = out.series.value_at(datetime!(2025-06-14 01:00)).unwrap();
            assert!((at_one - 10.8).abs() < 1e-9);
        }
    }

    #[test]
    fn register_report_wins_over_portal_anchor_at_the_same_midnight() {
        // The portal file hashes first, so only format priority can pick
        // the register report.
        let portal = dataset(SourceFormat::Legacy, "aaa", vec![anchor(datetime!(2025-06-14 00:00), 31433.803)]);
        let registers = dataset(
            SourceFormat::CumulativeAnchor,
            "zzz",
            vec![anchor(datetime!(2025-06-14 00:00), 31433.9)],
        );

        let r = Reconciler::new(0.05);
        for inputs in [[portal.clone(), registers.clone()], [registers, portal]] {
            let out = r.reconcile_channel(&inputs, Channel::Import).unwrap();
            assert_eq!(out.series.samples(), &[Sample::new(datetime!(2025-06-14 00:00), 31433.9)]);
        }
    }

    #[test]
    fn partially_covered_portal_hour_is_dropped_and_leaves_a_gap() {
        let portal = dataset(
            SourceFormat::Legacy,
            "portal",
            vec![
                anchor(datetime!(2025-06-14 00:00), 0.0),
                Reading::delta(Channel::Import, datetime!(2025-06-14 01:00), Duration::HOUR, 0.5),
                Reading::delta(Channel::Import, datetime!(2025-06-14 02:00), Duration::HOUR, 0.8),
                Reading::delta(Channel::Import, datetime!(2025-06-14 03:00), Duration::HOUR, 0.5),
                anchor(datetime!(2025-06-14 03:00), 1.8),
            ],
        );
        let profile = dataset(
            SourceFormat::IntervalDelta,
            "profile",
            vec![Reading::delta(Channel::Import, datetime!(2025-06-14 01:30), QH, 0.2)],
        );

        let out = Reconciler::new(0.05)
            .reconcile_channel(&[portal, profile], Channel::Import)
            .unwrap();

        assert_eq!(out.series.value_at(datetime!(2025-06-14 02:00)), None);
        assert!(out.series.value_at(datetime!(2025-06-14 01:30)).is_some());
        assert_eq!(out.series.value_at(datetime!(2025-06-14 03:00)), Some(1.8));
        assert!(matches!(
            out.warnings[..],
            [ReconciliationWarning::Drift { complete: false, .. }]
        ));
    }

    #[test]
    fn back_derived_samples_stay_inside_the_range() {
        let readings = vec![
            Reading::delta(Channel::Import, datetime!(2025-06-14 00:00), Duration::HOUR, 1.0),
            Reading::delta(Channel::Import, datetime!(2025-06-14 01:00), Duration::HOUR, 1.0),
            anchor(datetime!(2025-06-14 01:00), 10.0),
        ];
        let range = DateRange {
            start: date!(2025 - 06 - 14),
            end: date!(2025 - 06 - 14),
        };

        let out = Reconciler::new(0.05)
            .with_range(Some(range))
            .reconcile_channel(&[dataset(SourceFormat::Legacy, "a", readings)], Channel::Import)
            .unwrap();

        let got: Vec<(PrimitiveDateTime, f64)> = out.series.samples().iter().map(|s| (s.at, s.value)).collect();
        assert_eq!(
            got,
            vec![(datetime!(2025-06-14 00:00), 9.0), (datetime!(2025-06-14 01:00), 10.0)]
        );
    }

    #[test]
    fn same_format_conflicts_are_order_independent() {
        let a = dataset(SourceFormat::CumulativeAnchor, "aaa", vec![anchor(datetime!(2025-06-14 00:00), 5.0)]);
        let b = dataset(SourceFormat::CumulativeAnchor, "bbb", vec![anchor(datetime!(2025-06-14 00:00), 6.0)]);

        let r = Reconciler::new(0.05);
        let ab = r.reconcile_channel(&[a.clone(), b.clone()], Channel::Import).unwrap();
        let ba = r.reconcile_channel(&[b, a], Channel::Import).unwrap();
        assert_eq!(ab.series, ba.series);
        assert_eq!(ab.series.value_at(datetime!(2025-06-14 00:00)), Some(5.0));
    }

    #[test]
    fn deltas_before_first_anchor_are_derived_backwards() {
        let mut readings = quarter_hours(datetime!(2025-06-14 00:00), &[0.5, 0.5]);
        readings.push(anchor(datetime!(2025-06-14 00:30), 50.0));

        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::Legacy, "a", readings)], Channel::Import)
            .unwrap();

        let values: Vec<f64> = out.series.samples().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![49.0, 49.5, 50.0]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn series_without_anchors_starts_at_zero_with_low_confidence() {
        let readings = quarter_hours(datetime!(2025-06-14 00:00), &[0.25, 0.5]);
        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::IntervalDelta, "a", readings)], Channel::Import)
            .unwrap();

        assert!(out.series.low_confidence());
        assert_eq!(out.series.first(), Some(&Sample::new(datetime!(2025-06-14 00:00), 0.0)));
        assert_eq!(out.series.last().map(|s| s.value), Some(0.75));
        assert!(matches!(out.warnings[..], [ReconciliationWarning::NoAnchors { .. }]));
    }

    #[test]
    fn regressing_anchor_is_rejected() {
        let readings = vec![
            anchor(datetime!(2025-06-14 00:00), 100.0),
            anchor(datetime!(2025-06-15 00:00), 90.0),
            anchor(datetime!(2025-06-16 00:00), 110.0),
        ];
        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::CumulativeAnchor, "a", readings)], Channel::Import)
            .unwrap();

        assert_eq!(out.series.value_at(datetime!(2025-06-15 00:00)), None);
        assert_eq!(out.series.len(), 2);
        assert!(matches!(
            out.warnings[..],
            [ReconciliationWarning::AnchorRegression { value, .. }] if value == 90.0
        ));
        assert_eq!(out.series.resolution(), Duration::DAY);
    }

    #[test]
    fn gaps_are_not_filled_and_mark_the_window_incomplete() {
        let mut readings = quarter_hours(datetime!(2025-06-14 00:00), &[1.0]);
        readings.push(Reading::delta(Channel::Import, datetime!(2025-06-14 01:00), QH, 1.0));
        readings.push(anchor(datetime!(2025-06-14 00:00), 0.0));
        readings.push(anchor(datetime!(2025-06-14 01:00), 3.0));

        let out = Reconciler::new(0.05)
            .reconcile_channel(&[dataset(SourceFormat::Legacy, "a", readings)], Channel::Import)
            .unwrap();

        assert_eq!(out.series.value_at(datetime!(2025-06-14 00:15)), Some(1.0));
        assert_eq!(out.series.value_at(datetime!(2025-06-14 00:30)), None);
        assert_eq!(out.series.value_at(datetime!(2025-06-14 00:45)), None);
        assert!(matches!(
            out.warnings[..],
            [ReconciliationWarning::Drift { complete: false, .. }]
        ));
    }

    #[test]
    fn range_filter_and_missing_channel() {
        let readings = vec![
            anchor(datetime!(2025-06-13 00:00), 1.0),
            anchor(datetime!(2025-06-14 00:00), 2.0),
            anchor(datetime!(2025-06-15 00:00), 3.0),
            anchor(datetime!(2025-06-16 00:00), 4.0),
        ];
        let ds = [dataset(SourceFormat::CumulativeAnchor, "a", readings)];
        let range = DateRange {
            start: date!(2025 - 06 - 14),
            end: date!(2025 - 06 - 14),
        };

        let out = Reconciler::new(0.05)
            .with_range(Some(range))
            .reconcile_channel(&ds, Channel::Import)
            .unwrap();
        let kept: Vec<f64> = out.series.samples().iter().map(|s| s.value).collect();
        assert_eq!(kept, vec![2.0, 3.0]);

        let err = Reconciler::new(0.05).reconcile_channel(&ds, Channel::Export).unwrap_err();
        assert!(matches!(err, PipelineError::NoData(_)));
    }
}
