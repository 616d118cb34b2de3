//! E-mailed load profile (`AP_AM`): `Dátum/Idő;+A;-A`, one row per
//! 15-minute interval, stamped with the interval end, followed by
//! maximum/total footer rows.

use std::collections::{BTreeSet, HashMap};

use meter_domain::domain::{Channel, Reading, SourceFormat};
use time::{Date, Duration, PrimitiveDateTime};

use super::{
    cell,
    cells::{is_summary_cell, parse_stamp, Stamp},
    check_width, number, ParseOptions, RawRow, RawTable, RowTally, Signature,
};
use crate::pipeline::PipelineError;

pub const INTERVAL: Duration = Duration::minutes(15);

pub(crate) fn parse(table: &RawTable, options: &ParseOptions) -> Result<(Vec<Reading>, RowTally), PipelineError> {
    let signature = Signature::of(SourceFormat::IntervalDelta);
    let columns = signature.bind(&table.header)?;
    let (stamp_idx, import_idx, export_idx) = (columns[0], columns[1], columns[2]);

    let mut tally = RowTally::new(SourceFormat::IntervalDelta, table);
    let mut day_rows: HashMap<Date, i32> = HashMap::new();
    let mut seen: BTreeSet<PrimitiveDateTime> = BTreeSet::new();
    let mut readings = Vec::with_capacity(table.rows.len() * 2);

    for row in &table.rows {
        if signature.has_summary_rows && row.cell(stamp_idx).is_some_and(is_summary_cell) {
            tally.summary(row.line);
            continue;
        }

        // The implied slot is taken before any other check so a rejected
        // row does not shift the rest of its day.
        let parsed = end_of_interval(row, stamp_idx, &mut day_rows).and_then(|end| {
            check_width(row, signature.expected_columns())?;
            let import = options.check_delta(number(row, import_idx)?)?;
            let export = options.check_delta(number(row, export_idx)?)?;
            Ok((end, import, export))
        });

        match parsed {
            Ok((end, _, _)) if !seen.insert(end) => {
                tally.skip(row.line, format!("duplicate interval ending {end}"));
            }
            Ok((end, import, export)) => {
                tally.data();
                readings.push(Reading::delta(Channel::Import, end, INTERVAL, import));
                readings.push(Reading::delta(Channel::Export, end, INTERVAL, export));
            }
            Err(reason) => tally.skip(row.line, reason),
        }
    }

    Ok((readings, tally))
}

/// Date-only cells imply the time from row order within that date: the
/// n-th row (0-based) ends at `00:00 + (n + 1) × 15 min`.
fn end_of_interval(row: &RawRow, idx: usize, day_rows: &mut HashMap<Date, i32>) -> Result<PrimitiveDateTime, String> {
    let raw = cell(row, idx)?;
    match parse_stamp(raw) {
        Some(Stamp::At(end)) => Ok(end),
        Some(Stamp::Day(day)) => {
            let n = day_rows.entry(day).or_insert(0);
            *n += 1;
            Ok(day.midnight() + INTERVAL * *n)
        }
        None => Err(format!("unparsable timestamp '{raw}'")),
    }
}
