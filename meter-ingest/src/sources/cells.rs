//! Cell-level parsing shared by all export formats: locale numbers,
//! the utility's timestamp spellings and header-token normalisation.

use time::{Date, Month, PrimitiveDateTime, Time};

/// Footer markers (maximum / total rows) in normalised form.
const SUMMARY_MARKERS: &[&str] = &["maximum", "osszeg", "sum", "total"];

/// A parsed timestamp cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Date and time of day.
    At(PrimitiveDateTime),
    /// Date only; the time of day is implied by context.
    Day(Date),
}

impl Stamp {
    /// Midnight for date-only cells.
    pub fn or_midnight(self) -> PrimitiveDateTime {
        match self {
            Stamp::At(at) => at,
            Stamp::Day(day) => day.midnight(),
        }
    }
}

/// Lower-cases, strips quotes and folds Hungarian diacritics so that
/// `Dátum/Idő`, `DATUM/IDO` and `'datum/ido'` compare equal.
pub fn normalize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        let folded = match ch {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'ő' => 'o',
            'ú' | 'ù' | 'û' | 'ü' | 'ű' => 'u',
            '\'' | '"' | '\u{feff}' | '\u{fffd}' => continue,
            c if c.is_whitespace() => ' ',
            c => c,
        };
        if folded == ' ' && (out.is_empty() || out.ends_with(' ')) {
            continue;
        }
        out.push(folded);
    }
    out.trim_end().to_string()
}

/// True for maximum/total footer rows, judged by their first cell.
pub fn is_summary_cell(cell: &str) -> bool {
    let token = normalize_token(cell);
    SUMMARY_MARKERS.iter().any(|m| token.contains(m))
}

/// Parses a meter value written with either decimal comma or decimal
/// point, with optional thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) if cleaned.matches(',').count() == 1 => cleaned.replace(',', "."),
        (Some(_), None) => cleaned.replace(',', ""),
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses `2025.06.14 00:00:00`, `2025.06.14. 00:15`, `2025-06-14T00:15`
/// and the date-only forms `2025.06.14.` / `2025-06-14`.
pub fn parse_stamp(raw: &str) -> Option<Stamp> {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    let mut parts = trimmed.splitn(2, |c: char| c == ' ' || c == 'T');
    let date = parse_date(parts.next()?)?;

    match parts.next().map(str::trim).filter(|t| !t.is_empty()) {
        None => Some(Stamp::Day(date)),
        Some(time_part) => {
            let time = parse_time(time_part)?;
            Some(Stamp::At(PrimitiveDateTime::new(date, time)))
        }
    }
}

fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim().trim_end_matches('.');
    let mut fields = raw.split(|c| c == '.' || c == '-' || c == '/');
    let year: i32 = fields.next()?.trim().parse().ok()?;
    let month: u8 = fields.next()?.trim().parse().ok()?;
    let day: u8 = fields.next()?.trim().parse().ok()?;
    if fields.next().is_some() || year < 1000 {
        return None;
    }
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn parse_time(raw: &str) -> Option<Time> {
    let mut fields = raw.split(':');
    let hour: u8 = fields.next()?.trim().parse().ok()?;
    let minute: u8 = fields.next()?.trim().parse().ok()?;
    let second: u8 = match fields.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };
    if fields.next().is_some() {
        return None;
    }
    Time::from_hms(hour, minute, second).ok()
}
