//! Web-portal export: `POD Name;Variable name;Time;Value [kWh]`, one
//! variable per row, hourly deltas interleaved with daily register reads.

use std::collections::{BTreeMap, BTreeSet};

use meter_domain::domain::{Channel, Reading, SourceFormat};
use time::{Duration, PrimitiveDateTime};

use super::{cell, cells::parse_stamp, check_width, number, ParseOptions, RawRow, RawTable, RowTally, Signature};
use crate::pipeline::PipelineError;

/// Delta interval used when a channel has a single delta row.
const DEFAULT_INTERVAL: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy)]
struct Columns {
    variable: usize,
    time: usize,
    value: usize,
}

#[derive(Debug, Clone, Copy)]
struct PortalRow {
    channel: Channel,
    anchor: bool,
    at: PrimitiveDateTime,
    value: f64,
}

pub(crate) fn parse(table: &RawTable, options: &ParseOptions) -> Result<(Vec<Reading>, RowTally), PipelineError> {
    let signature = Signature::of(SourceFormat::Legacy);
    let bound = signature.bind(&table.header)?;
    let columns = Columns {
        variable: bound[1],
        time: bound[2],
        value: bound[3],
    };

    let mut tally = RowTally::new(SourceFormat::Legacy, table);
    let mut seen = BTreeSet::new();
    let mut anchors = Vec::new();
    let mut labelled = Vec::new();

    for row in &table.rows {
        match read_row(row, columns, signature.expected_columns(), options) {
            Ok(None) => tally.ignored(),
            Ok(Some(r)) => {
                if !seen.insert((r.channel, r.anchor, r.at)) {
                    tally.skip(row.line, format!("duplicate {} reading at {}", r.channel, r.at));
                    continue;
                }
                tally.data();
                if r.anchor {
                    anchors.push(Reading::anchor(r.channel, r.at, r.value));
                } else {
                    labelled.push(r);
                }
            }
            Err(reason) => tally.skip(row.line, reason),
        }
    }

    // Portal delta rows carry the interval start; readings carry the end.
    let intervals = infer_intervals(&labelled);
    let deltas = labelled.iter().map(|r| {
        let interval = intervals.get(&r.channel).copied().unwrap_or(DEFAULT_INTERVAL);
        Reading::delta(r.channel, r.at + interval, interval, r.value)
    });

    Ok((anchors.into_iter().chain(deltas).collect(), tally))
}

fn read_row(
    row: &RawRow,
    columns: Columns,
    width: usize,
    options: &ParseOptions,
) -> Result<Option<PortalRow>, String> {
    check_width(row, width)?;
    let Some((channel, anchor)) = options.variables.classify(cell(row, columns.variable)?) else {
        return Ok(None);
    };

    let raw = cell(row, columns.time)?;
    let at = parse_stamp(raw)
        .ok_or_else(|| format!("unparsable timestamp '{raw}'"))?
        .or_midnight();
    let value = number(row, columns.value)?;
    let value = if anchor {
        options.check_anchor(value)?
    } else {
        options.check_delta(value)?
    };

    Ok(Some(PortalRow {
        channel,
        anchor,
        at,
        value,
    }))
}

/// Smallest spacing between consecutive delta labels, per channel.
fn infer_intervals(rows: &[PortalRow]) -> BTreeMap<Channel, Duration> {
    let mut labels: BTreeMap<Channel, BTreeSet<PrimitiveDateTime>> = BTreeMap::new();
    for r in rows {
        labels.entry(r.channel).or_default().insert(r.at);
    }
    labels
        .into_iter()
        .map(|(channel, stamps)| {
            let step = stamps
                .iter()
                .zip(stamps.iter().skip(1))
                .map(|(a, b)| *b - *a)
                .min()
                .unwrap_or(DEFAULT_INTERVAL);
            (channel, step)
        })
        .collect()
}
