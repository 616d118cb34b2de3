use meter_domain::domain::{Channel, Resolution, SourceFormat};
use serde::Deserialize;
use std::{fs, path::Path};
use time::{Date, PrimitiveDateTime, UtcOffset};

use crate::sources::ParseOptions;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(
    offset_format,
    UtcOffset,
    "[offset_hour sign:mandatory]:[offset_minute]"
);

const CONFIG_ENV: &str = "METER_STATISTICS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "meter-statistics.toml";

/// Inclusive calendar range readings are restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    #[serde(with = "iso_date")]
    pub start: Date,
    #[serde(with = "iso_date")]
    pub end: Date,
}

impl DateRange {
    /// Instants covered: `[start 00:00, (end + 1 day) 00:00]`, so the
    /// closing midnight register reading of `end` is included.
    pub fn contains(&self, at: PrimitiveDateTime) -> bool {
        let lo = self.start.midnight();
        let hi = self.end.midnight() + time::Duration::days(1);
        at >= lo && at <= hi
    }
}

/// Legacy portal variable names and the channel/kind they stand for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VariableNames {
    pub import_delta: String,
    pub export_delta: String,
    pub import_anchor: String,
    pub export_anchor: String,
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            import_delta: "+A".to_string(),
            export_delta: "-A".to_string(),
            import_anchor: "DP_1-1:1.8.0*0".to_string(),
            export_anchor: "DP_1-1:2.8.0*0".to_string(),
        }
    }
}

impl VariableNames {
    /// Maps a variable cell (quotes tolerated) to `(channel, is_anchor)`.
    pub fn classify(&self, variable: &str) -> Option<(Channel, bool)> {
        let name = strip_quotes(variable);
        [
            (&self.import_delta, Channel::Import, false),
            (&self.export_delta, Channel::Export, false),
            (&self.import_anchor, Channel::Import, true),
            (&self.export_anchor, Channel::Export, true),
        ]
        .into_iter()
        .find(|(known, _, _)| strip_quotes(known).eq_ignore_ascii_case(name))
        .map(|(_, channel, anchor)| (channel, anchor))
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '\'' || c == '"')
}

/// Everything the processing core consumes from its caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub resolution: Resolution,
    /// Largest anchor-vs-estimate difference absorbed without a warning.
    pub tolerance_kwh: f64,
    #[serde(with = "offset_format")]
    pub utc_offset: UtcOffset,
    /// Skips detection and parses every input as this format.
    pub format_override: Option<SourceFormat>,
    /// Duplicate the cumulative value as `state` on every record.
    pub include_state: bool,
    pub decimals: u32,
    /// Plausibility bound for a single delta reading.
    pub max_delta_kwh: f64,
    pub range: Option<DateRange>,
    pub variables: VariableNames,
    pub channels: Vec<Channel>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Hourly,
            tolerance_kwh: 0.05,
            utc_offset: UtcOffset::UTC,
            format_override: None,
            include_state: true,
            decimals: 3,
            max_delta_kwh: 50.0,
            range: None,
            variables: VariableNames::default(),
            channels: Channel::ALL.to_vec(),
        }
    }
}

impl StatisticsConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            variables: self.variables.clone(),
            max_delta_kwh: self.max_delta_kwh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub statistics: StatisticsConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    /// Reads the file named by `METER_STATISTICS_CONFIG`, else
    /// `meter-statistics.toml` when present, else built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        match env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from(&path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load_from(DEFAULT_CONFIG_PATH),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}
