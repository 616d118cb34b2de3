use time::{Duration, PrimitiveDateTime};

use super::Channel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingKind {
    /// Absolute register value at `at`.
    Anchor,
    /// Energy over the interval `(at - interval, at]`.
    Delta { interval: Duration },
}

/// One timestamped observation on one channel.
///
/// Timestamps are local wall-clock times as printed in the export; the UTC
/// offset is applied only when statistics are emitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub channel: Channel,
    pub at: PrimitiveDateTime,
    pub value: f64,
    pub kind: ReadingKind,
}

impl Reading {
    pub fn anchor(channel: Channel, at: PrimitiveDateTime, value: f64) -> Self {
        Self {
            channel,
            at,
            value,
            kind: ReadingKind::Anchor,
        }
    }

    pub fn delta(channel: Channel, end: PrimitiveDateTime, interval: Duration, value: f64) -> Self {
        Self {
            channel,
            at: end,
            value,
            kind: ReadingKind::Delta { interval },
        }
    }

    pub fn is_anchor(&self) -> bool {
        matches!(self.kind, ReadingKind::Anchor)
    }

    pub fn interval(&self) -> Option<Duration> {
        match self.kind {
            ReadingKind::Anchor => None,
            ReadingKind::Delta { interval } => Some(interval),
        }
    }

    /// Start of the observed interval; equal to `at` for anchors.
    pub fn start(&self) -> PrimitiveDateTime {
        match self.kind {
            ReadingKind::Anchor => self.at,
            ReadingKind::Delta { interval } => self.at - interval,
        }
    }

    /// Sort rank at equal timestamps: deltas ending at `t` are part of the
    /// register value at `t`, so they come before an anchor at `t`.
    pub(crate) fn kind_rank(&self) -> u8 {
        match self.kind {
            ReadingKind::Delta { .. } => 0,
            ReadingKind::Anchor => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn delta_start_is_end_minus_interval() {
        let r = Reading::delta(
            Channel::Import,
            datetime!(2025-06-14 00:15),
            Duration::minutes(15),
            0.08,
        );
        assert_eq!(r.start(), datetime!(2025-06-14 00:00));
        assert_eq!(r.interval(), Some(Duration::minutes(15)));
        assert!(!r.is_anchor());
    }

    #[test]
    fn anchor_has_no_interval() {
        let r = Reading::anchor(Channel::Export, datetime!(2025-06-14 00:00), 2000.0);
        assert!(r.is_anchor());
        assert_eq!(r.interval(), None);
        assert_eq!(r.start(), r.at);
    }
}
