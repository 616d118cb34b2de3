use std::{fmt, str::FromStr};

use super::DomainError;

/// Physical energy flow tracked by the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Channel {
    /// Energy drawn from the grid (register 1.8.0, `+A`).
    Import,
    /// Energy fed into the grid (register 2.8.0, `-A`).
    Export,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Import, Channel::Export];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Import => "import",
            Channel::Export => "export",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "import" | "+a" => Ok(Channel::Import),
            "export" | "-a" => Ok(Channel::Export),
            other => Err(DomainError::UnknownChannel(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_parses_names_and_register_signs() {
        assert_eq!("Import".parse::<Channel>(), Ok(Channel::Import));
        assert_eq!("-A".parse::<Channel>(), Ok(Channel::Export));
        assert!(matches!(
            "net".parse::<Channel>(),
            Err(DomainError::UnknownChannel(_))
        ));
    }

    #[test]
    fn channels_order_import_first() {
        let mut all = vec![Channel::Export, Channel::Import];
        all.sort();
        assert_eq!(all, Channel::ALL.to_vec());
    }
}
