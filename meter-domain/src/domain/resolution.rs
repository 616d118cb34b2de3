use std::{fmt, str::FromStr};

use time::Duration;

use super::DomainError;

/// Bucket size of emitted statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Resolution {
    /// Every reconciled sample, unbucketed.
    #[cfg_attr(feature = "serde", serde(rename = "native", alias = "raw"))]
    Native,
    #[cfg_attr(feature = "serde", serde(rename = "15min", alias = "quarter_hour"))]
    QuarterHour,
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "hourly"))]
    Hourly,
    #[cfg_attr(feature = "serde", serde(rename = "daily"))]
    Daily,
}

impl Resolution {
    /// Bucket width; `None` for [`Resolution::Native`].
    pub fn step(self) -> Option<Duration> {
        match self {
            Resolution::Native => None,
            Resolution::QuarterHour => Some(Duration::minutes(15)),
            Resolution::Hourly => Some(Duration::hours(1)),
            Resolution::Daily => Some(Duration::days(1)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Native => "native",
            Resolution::QuarterHour => "15min",
            Resolution::Hourly => "hourly",
            Resolution::Daily => "daily",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "raw" => Ok(Resolution::Native),
            "15min" | "quarter_hour" => Ok(Resolution::QuarterHour),
            "hourly" => Ok(Resolution::Hourly),
            "daily" => Ok(Resolution::Daily),
            other => Err(DomainError::UnknownResolution(other.to_string())),
        }
    }
}
