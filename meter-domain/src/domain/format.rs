use std::{fmt, str::FromStr};

use super::DomainError;

/// The export schemas a utility hands out for the same meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SourceFormat {
    /// Web-portal export: one row per (variable, time), hourly deltas and
    /// daily register readings interleaved.
    Legacy,
    /// E-mailed load profile: 15-minute import/export deltas.
    #[cfg_attr(feature = "serde", serde(alias = "ap_am"))]
    IntervalDelta,
    /// E-mailed register report: daily absolute 1.8.0 / 2.8.0 readings.
    #[cfg_attr(feature = "serde", serde(alias = "180_280"))]
    CumulativeAnchor,
}

impl SourceFormat {
    /// Conflict priority when two sources cover the same instant.
    /// Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            SourceFormat::IntervalDelta => 3,
            SourceFormat::CumulativeAnchor => 2,
            SourceFormat::Legacy => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Legacy => "legacy",
            SourceFormat::IntervalDelta => "interval_delta",
            SourceFormat::CumulativeAnchor => "cumulative_anchor",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(SourceFormat::Legacy),
            "interval_delta" | "ap_am" => Ok(SourceFormat::IntervalDelta),
            "cumulative_anchor" | "180_280" => Ok(SourceFormat::CumulativeAnchor),
            other => Err(DomainError::UnknownFormat(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_delta_outranks_everything() {
        assert!(SourceFormat::IntervalDelta.priority() > SourceFormat::CumulativeAnchor.priority());
        assert!(SourceFormat::CumulativeAnchor.priority() > SourceFormat::Legacy.priority());
    }

    #[test]
    fn format_parses_file_family_aliases() {
        assert_eq!("AP_AM".parse::<SourceFormat>(), Ok(SourceFormat::IntervalDelta));
        assert_eq!("180_280".parse::<SourceFormat>(), Ok(SourceFormat::CumulativeAnchor));
        assert!("xlsx".parse::<SourceFormat>().is_err());
    }
}
