use meter_domain::domain::SkippedRow;

use crate::pipeline::PipelineError;

/// A file's bytes as handed over by the caller. The core never touches the
/// filesystem itself.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawInput {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Decoded text with any leading byte-order mark removed.
    pub fn text(&self) -> String {
        let decoded = String::from_utf8_lossy(&self.bytes);
        decoded.strip_prefix('\u{feff}').unwrap_or(&decoded).to_string()
    }

    /// Hex blake3 digest of the raw bytes.
    pub fn fingerprint(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line in the source.
    pub line: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn cell(&self, idx: usize) -> Option<&str> {
        self.cells.get(idx).map(String::as_str)
    }

    /// Cell count ignoring trailing empty cells left by a trailing delimiter.
    pub fn width(&self) -> usize {
        self.cells.len() - self.cells.iter().rev().take_while(|c| c.is_empty()).count()
    }
}

/// Header plus data rows of a delimited export.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Records the CSV reader itself could not decode.
    pub unreadable: Vec<SkippedRow>,
}

impl RawTable {
    /// Splits `text` with `delimiter`. Blank lines are dropped; the first
    /// non-blank record becomes the header.
    pub fn read(text: &str, delimiter: u8) -> Result<Self, PipelineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let lines = LineIndex::new(text);
        let mut header: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        let mut unreadable = Vec::new();

        for result in rdr.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    let line = lines.line_of(e.position());
                    if header.is_none() {
                        return Err(PipelineError::Csv(e));
                    }
                    unreadable.push(SkippedRow {
                        line,
                        reason: format!("unreadable record: {e}"),
                    });
                    continue;
                }
            };
            if record.iter().all(str::is_empty) {
                continue;
            }
            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            if header.is_none() {
                header = Some(cells);
                continue;
            }
            let line = lines.line_of(record.position());
            rows.push(RawRow { line, cells });
        }

        Ok(Self {
            header: header.unwrap_or_default(),
            rows,
            unreadable,
        })
    }
}

/// Maps csv byte positions to 1-based source lines.
struct LineIndex<'a> {
    bytes: &'a [u8],
    newlines: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            newlines: text.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    /// The reader may report a record as starting on the blank lines it
    /// skipped before it, so leading line breaks are stepped over first.
    fn line_of(&self, position: Option<&csv::Position>) -> usize {
        let Some(position) = position else { return 0 };
        let start = usize::try_from(position.byte()).unwrap_or(usize::MAX).min(self.bytes.len());
        let first = self.bytes[start..]
            .iter()
            .position(|b| !matches!(b, b'\n' | b'\r'))
            .map_or(self.bytes.len(), |offset| start + offset);
        self.newlines.partition_point(|&nl| nl < first) + 1
    }
}

/// First non-blank line of `text`.
pub fn header_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Splits a single line with CSV quoting rules.
pub fn split_line(line: &str, delimiter: u8) -> Vec<String> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    match rdr.records().next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        _ => vec![line.to_string()],
    }
}
