use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, trace};

use crate::error::BuildError;
use crate::process::date_parser::{parse_timestamp, round_to_cadence, Cadence, TimestampLayout};
use crate::process::diagnostics::{Diagnostic, Diagnostics};
use crate::process::raw_table::IndexedRow;
use crate::process::utils::clean_number;

/// One observation. `value` is `None` when the balance cell could not be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampedRecord {
    pub timestamp: NaiveDateTime,
    pub value: Option<Decimal>,
    pub layout: TimestampLayout,
}

/// Records strictly increasing by timestamp. Immutable once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Series {
    records: Vec<TimestampedRecord>,
}

impl Series {
    pub fn new(records: Vec<TimestampedRecord>) -> Result<Self, BuildError> {
        if let Some(pair) = records.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(BuildError::NotIncreasing {
                at: pair[1].timestamp,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[TimestampedRecord] {
        &self.records
    }

    pub fn first(&self) -> Option<&TimestampedRecord> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&TimestampedRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Projects data rows onto (timestamp, balance) pairs.
#[derive(Clone, Copy, Debug)]
pub struct SeriesBuilder {
    time_col: usize,
    balance_col: usize,
    cadence: Cadence,
}

impl SeriesBuilder {
    pub fn new(time_col: usize, balance_col: usize, cadence: Cadence) -> Self {
        Self {
            time_col,
            balance_col,
            cadence,
        }
    }

    /// Build a series from already-filtered data rows.
    ///
    /// - unparsable timestamps drop the row
    /// - unparsable balances keep the row with a missing value
    /// - rows rounding onto an earlier row's timestamp are dropped (first wins)
    pub fn build(
        &self,
        rows: &[IndexedRow],
        diagnostics: &mut Diagnostics,
    ) -> Result<Series, BuildError> {
        let mut seen: HashSet<NaiveDateTime> = HashSet::with_capacity(rows.len());
        let mut records: Vec<TimestampedRecord> = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;

        for row in rows {
            let time_text = row.cell(self.time_col).unwrap_or_default();
            let stamp = match parse_timestamp(time_text) {
                Ok(stamp) => stamp,
                Err(error) => {
                    trace!(row = row.index, %error, "dropping row");
                    diagnostics.push(Diagnostic::UnparsableTimestamp {
                        row: row.index,
                        error,
                    });
                    dropped += 1;
                    continue;
                }
            };

            let timestamp = round_to_cadence(stamp.instant, self.cadence);
            if !seen.insert(timestamp) {
                diagnostics.push(Diagnostic::DuplicateTimestamp {
                    row: row.index,
                    timestamp,
                });
                continue;
            }

            let balance_text = row.cell(self.balance_col).unwrap_or_default();
            let value = match clean_number(balance_text) {
                Ok(v) => Some(v),
                Err(error) => {
                    diagnostics.push(Diagnostic::MissingValue {
                        row: row.index,
                        error,
                    });
                    None
                }
            };

            records.push(TimestampedRecord {
                timestamp,
                value,
                layout: stamp.layout,
            });
        }

        if records.is_empty() {
            return Err(BuildError::EmptySeries { dropped });
        }

        records.sort_by_key(|r| r.timestamp);
        debug!(
            kept = records.len(),
            dropped,
            cadence = %self.cadence,
            "series built"
        );
        Series::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn rows(data: &[(&str, &str)]) -> Vec<IndexedRow> {
        data.iter()
            .enumerate()
            .map(|(i, (t, v))| IndexedRow::new(i, vec![t.to_string(), v.to_string()]))
            .collect()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn builder() -> SeriesBuilder {
        SeriesBuilder::new(0, 1, Cadence::FIFTEEN_MINUTES)
    }

    #[test]
    fn builds_sorted_rounded_series() {
        let mut diags = Diagnostics::new();
        let series = builder()
            .build(
                &rows(&[
                    ("2023.12.01 10:22", "101.0"),
                    ("2023.12.01 10:07", "100.5 "),
                ]),
                &mut diags,
            )
            .unwrap();
        let got: Vec<_> = series
            .records()
            .iter()
            .map(|r| (r.timestamp, r.value))
            .collect();
        assert_eq!(
            got,
            vec![(at(10, 0), Some(dec("100.5"))), (at(10, 15), Some(dec("101.0")))]
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let mut diags = Diagnostics::new();
        let series = builder()
            .build(
                &rows(&[
                    ("2023.12.01 10:14", "1"),
                    ("2023.12.01 10:16", "2"),
                    ("2023.12.01 10:30", "3"),
                ]),
                &mut diags,
            )
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.records()[0].timestamp, at(10, 15));
        assert_eq!(series.records()[0].value, Some(dec("1")));
        assert_eq!(
            diags.iter().collect::<Vec<_>>(),
            vec![&Diagnostic::DuplicateTimestamp {
                row: 1,
                timestamp: at(10, 15)
            }]
        );
    }

    #[test]
    fn bad_cells_are_recovered_per_row() {
        let mut diags = Diagnostics::new();
        let series = builder()
            .build(
                &rows(&[
                    ("2023.12.01 10:00", "100"),
                    ("not a time", "5"),
                    ("2023.12.01 10:30", "oops"),
                ]),
                &mut diags,
            )
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.records()[1].value, None);
        let summary = diags.summary();
        assert_eq!(summary.unparsable_timestamps, 1);
        assert_eq!(summary.missing_values, 1);
        assert!(diags.iter().any(|d| matches!(
            d,
            Diagnostic::UnparsableTimestamp { row: 1, error: ParseError::Timestamp { literal } }
                if literal == "not a time"
        )));
    }

    #[test]
    fn all_rows_failing_is_empty_series() {
        let mut diags = Diagnostics::new();
        let err = builder()
            .build(&rows(&[("garbage", "1")]), &mut diags)
            .unwrap_err();
        assert_eq!(err, BuildError::EmptySeries { dropped: 1 });
    }

    #[test]
    fn series_rejects_unordered_records() {
        let layout = TimestampLayout::DOTTED;
        let err = Series::new(vec![
            TimestampedRecord {
                timestamp: at(10, 15),
                value: None,
                layout,
            },
            TimestampedRecord {
                timestamp: at(10, 15),
                value: None,
                layout,
            },
        ])
        .unwrap_err();
        assert_eq!(err, BuildError::NotIncreasing { at: at(10, 15) });
    }
}
