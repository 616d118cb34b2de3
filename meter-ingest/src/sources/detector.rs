use meter_domain::domain::SourceFormat;

use super::{
    cells::{is_summary_cell, normalize_token, parse_stamp},
    raw::{header_line, split_line},
};
use crate::pipeline::PipelineError;

/// Delimiters tried, in order, against the header row.
const DELIMITERS: [u8; 3] = [b';', b',', b'\t'];

#[derive(Debug, Clone, Copy)]
enum Column {
    /// Header equals one of these spellings once normalised.
    Named(&'static [&'static str]),
    /// Header mentions this OBIS register id.
    Register(&'static str),
}

impl Column {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            Column::Named(names) => names.iter().any(|n| *n == normalized),
            Column::Register(id) => normalized.contains(id),
        }
    }
}

/// Required header columns of one export format.
#[derive(Debug)]
pub struct Signature {
    pub format: SourceFormat,
    columns: &'static [Column],
    timestamp_column: usize,
    pub has_summary_rows: bool,
}

static SIGNATURES: [Signature; 3] = [
    Signature {
        format: SourceFormat::Legacy,
        columns: &[
            Column::Named(&["pod name", "pod", "pod nev"]),
            Column::Named(&["variable name", "valtozo neve", "valtozo"]),
            Column::Named(&["time", "ido", "idopont"]),
            Column::Named(&["value [kwh]", "value", "ertek [kwh]", "ertek"]),
        ],
        timestamp_column: 2,
        has_summary_rows: false,
    },
    Signature {
        format: SourceFormat::IntervalDelta,
        columns: &[
            Column::Named(&["datum/ido", "date/time", "datetime", "datum ido"]),
            Column::Named(&["+a", "+a [kwh]"]),
            Column::Named(&["-a", "-a [kwh]"]),
        ],
        timestamp_column: 0,
        has_summary_rows: true,
    },
    Signature {
        format: SourceFormat::CumulativeAnchor,
        columns: &[
            Column::Named(&["datum", "date", "nap"]),
            Column::Register("1.8.0"),
            Column::Register("2.8.0"),
        ],
        timestamp_column: 0,
        has_summary_rows: true,
    },
];

impl Signature {
    pub fn of(format: SourceFormat) -> &'static Signature {
        match format {
            SourceFormat::Legacy => &SIGNATURES[0],
            SourceFormat::IntervalDelta => &SIGNATURES[1],
            SourceFormat::CumulativeAnchor => &SIGNATURES[2],
        }
    }

    pub fn expected_columns(&self) -> usize {
        self.columns.len()
    }

    /// Header index of every required column, in declaration order.
    pub fn locate(&self, header: &[String]) -> Option<Vec<usize>> {
        let normalized: Vec<String> = header.iter().map(|h| normalize_token(h)).collect();
        let mut found: Vec<usize> = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            let idx = (0..normalized.len())
                .find(|i| !found.contains(i) && column.matches(&normalized[*i]))?;
            found.push(idx);
        }
        Some(found)
    }

    /// [`Signature::locate`] plus the column-count check a parser needs
    /// before trusting positions.
    pub fn bind(&self, header: &[String]) -> Result<Vec<usize>, PipelineError> {
        let columns = self.locate(header).ok_or_else(|| PipelineError::MalformedHeader {
            format: self.format,
            reason: format!("required columns missing from header {header:?}"),
        })?;
        let width = trimmed_width(header);
        if width != self.expected_columns() {
            return Err(PipelineError::MalformedHeader {
                format: self.format,
                reason: format!(
                    "expected {} columns, header has {width}",
                    self.expected_columns()
                ),
            });
        }
        Ok(columns)
    }
}

fn trimmed_width(cells: &[String]) -> usize {
    cells.len() - cells.iter().rev().take_while(|c| c.is_empty()).count()
}

/// Outcome of classifying one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub format: SourceFormat,
    pub delimiter: u8,
    /// `[0.5, 1.0]` from sampled rows; `1.0` for a forced format.
    pub confidence: f64,
    pub sampled_rows: usize,
}

/// Schema-based classifier: required header tokens per format, delimiter
/// inferred from the header row.
#[derive(Debug, Clone)]
pub struct FormatDetector {
    sample_rows: usize,
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self { sample_rows: 10 }
    }
}

impl FormatDetector {
    pub fn detect(&self, name: &str, text: &str) -> Result<Detection, PipelineError> {
        let header = header_line(text)
            .ok_or_else(|| PipelineError::UnrecognizedFormat(format!("{name}: no header row")))?;

        // A delimiter that finds the tokens with the wrong column count is
        // kept as a fallback so the parser can report the malformed header.
        let mut fallback: Option<(u8, &'static Signature, Vec<usize>)> = None;
        for delimiter in DELIMITERS {
            let cells = split_line(header, delimiter);
            for signature in SIGNATURES.iter() {
                let Some(columns) = signature.locate(&cells) else {
                    continue;
                };
                if trimmed_width(&cells) == signature.expected_columns() {
                    return Ok(self.finish(signature, delimiter, &columns, text));
                }
                fallback.get_or_insert((delimiter, signature, columns));
            }
        }

        match fallback {
            Some((delimiter, signature, columns)) => Ok(self.finish(signature, delimiter, &columns, text)),
            None => Err(PipelineError::UnrecognizedFormat(format!(
                "{name}: header '{header}' matches no known export"
            ))),
        }
    }

    /// Trusts `format` and only infers the delimiter.
    pub fn confirm(&self, name: &str, text: &str, format: SourceFormat) -> Result<Detection, PipelineError> {
        let signature = Signature::of(format);
        let header = header_line(text).unwrap_or_default();
        DELIMITERS
            .into_iter()
            .find(|d| signature.locate(&split_line(header, *d)).is_some())
            .map(|delimiter| Detection {
                format,
                delimiter,
                confidence: 1.0,
                sampled_rows: 0,
            })
            .ok_or_else(|| PipelineError::MalformedHeader {
                format,
                reason: format!("{name}: header '{header}' lacks the {format} columns"),
            })
    }

    fn finish(&self, signature: &Signature, delimiter: u8, columns: &[usize], text: &str) -> Detection {
        let stamp_idx = columns[signature.timestamp_column];
        let sample: Vec<Vec<String>> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .skip(1)
            .map(|l| split_line(l, delimiter))
            .filter(|cells| !(signature.has_summary_rows && cells.first().is_some_and(|c| is_summary_cell(c))))
            .take(self.sample_rows)
            .collect();

        let parsed = sample
            .iter()
            .filter(|cells| cells.get(stamp_idx).and_then(|c| parse_stamp(c)).is_some())
            .count();
        let confidence = if sample.is_empty() {
            0.5
        } else {
            0.5 + 0.5 * parsed as f64 / sample.len() as f64
        };

        tracing::debug!(
            format = %signature.format,
            delimiter = %(delimiter as char).escape_default(),
            confidence,
            "format detected"
        );

        Detection {
            format: signature.format,
            delimiter,
            confidence,
            sampled_rows: sample.len(),
        }
    }
}
