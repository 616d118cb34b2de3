//! E-mailed register report (`180_280`): `Dátum;DP_1-1:1.8.0*0;DP_1-1:2.8.0*0`,
//! one absolute import/export register pair per day.

use std::collections::BTreeSet;

use meter_domain::domain::{Channel, Reading, SourceFormat};

use super::{cell, cells::is_summary_cell, cells::parse_stamp, check_width, number, ParseOptions, RawTable, RowTally, Signature};
use crate::pipeline::PipelineError;

pub(crate) fn parse(table: &RawTable, options: &ParseOptions) -> Result<(Vec<Reading>, RowTally), PipelineError> {
    let signature = Signature::of(SourceFormat::CumulativeAnchor);
    let columns = signature.bind(&table.header)?;
    let (date_idx, import_idx, export_idx) = (columns[0], columns[1], columns[2]);

    let mut tally = RowTally::new(SourceFormat::CumulativeAnchor, table);
    let mut seen = BTreeSet::new();
    let mut readings = Vec::with_capacity(table.rows.len() * 2);

    for row in &table.rows {
        if signature.has_summary_rows && row.cell(date_idx).is_some_and(is_summary_cell) {
            tally.summary(row.line);
            continue;
        }

        // The register pair for day D is the reading at D 00:00.
        let parsed = check_width(row, signature.expected_columns()).and_then(|()| {
            let raw = cell(row, date_idx)?;
            let at = parse_stamp(raw)
                .ok_or_else(|| format!("unparsable date '{raw}'"))?
                .or_midnight();
            let import = options.check_anchor(number(row, import_idx)?)?;
            let export = options.check_anchor(number(row, export_idx)?)?;
            Ok((at, import, export))
        });

        match parsed {
            Ok((at, _, _)) if !seen.insert(at) => {
                tally.skip(row.line, format!("duplicate register reading at {at}"));
            }
            Ok((at, import, export)) => {
                tally.data();
                readings.push(Reading::anchor(Channel::Import, at, import));
                readings.push(Reading::anchor(Channel::Export, at, export));
            }
            Err(reason) => tally.skip(row.line, reason),
        }
    }

    Ok((readings, tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn parse_text(text: &str) -> (Vec<Reading>, RowTally) {
        let table = RawTable::read(text, b';').unwrap();
        parse(&table, &ParseOptions::default()).unwrap()
    }

    #[test]
    fn daily_rows_become_midnight_anchors() {
        let (readings, tally) = parse_text(
            "Dátum;DP_1-1:1.8.0*0;DP_1-1:2.8.0*0\n\
2025.06.14.;31433,803;1200,500\n\
2025.06.15.;31441,560;1203,010\n",
        );
        assert_eq!(tally.data, 2);
        assert!(readings.iter().all(Reading::is_anchor));
        let import: Vec<_> = readings.iter().filter(|r| r.channel == Channel::Import).collect();
        assert_eq!(import[1].at, datetime!(2025-06-15 00:00));
        assert_eq!(import[1].value, 31441.56);
    }

    #[test]
    fn both_registers_are_required() {
        let (readings, tally) = parse_text(
            "Dátum;DP_1-1:1.8.0*0;DP_1-1:2.8.0*0\n\
2025.06.14.;31433,803;\n\
2025.06.15.;-1;1203,010\n\
2025.06.16.;31450,000;1204,000\n\
ÖSSZEG;;\n",
        );
        assert_eq!(readings.len(), 2);
        assert_eq!(tally.skipped.len(), 2);
        assert_eq!(tally.summary, 1);
    }
}
