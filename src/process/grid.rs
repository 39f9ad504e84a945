use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::RegularizeError;
use crate::process::date_parser::{Cadence, TimestampLayout};
use crate::process::diagnostics::{Diagnostic, Diagnostics};
use crate::process::raw_table::RawTable;
use crate::process::series::{Series, TimestampedRecord};

/// Closed, cadence-spaced timeline `start, start+Δ, …` up to the last point not
/// after `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    start: NaiveDateTime,
    len: usize,
    cadence: Cadence,
}

impl Grid {
    pub fn spanning(start: NaiveDateTime, end: NaiveDateTime, cadence: Cadence) -> Self {
        let step = cadence.as_duration().num_seconds();
        let span = (end - start).num_seconds().max(0);
        Self {
            start,
            len: (span / step) as usize + 1,
            cadence,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.point(self.len.saturating_sub(1))
    }

    fn point(&self, i: usize) -> NaiveDateTime {
        self.start + Duration::minutes(i64::from(self.cadence.minutes()) * i as i64)
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (0..self.len).map(move |i| self.point(i))
    }
}

/// One grid point after forward-fill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridPoint {
    pub timestamp: NaiveDateTime,
    pub value: Decimal,
    pub layout: TimestampLayout,
    /// True when the value was carried forward rather than observed here.
    pub imputed: bool,
}

/// A gap-free series whose timestamps are exactly a `Grid`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegularizedSeries {
    points: Vec<GridPoint>,
    cadence: Cadence,
}

impl RegularizedSeries {
    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn imputed(&self) -> usize {
        self.points.iter().filter(|p| p.imputed).count()
    }

    /// (timestamp, value) pairs, ignoring how each value was obtained.
    pub fn pairs(&self) -> Vec<(NaiveDateTime, Decimal)> {
        self.points.iter().map(|p| (p.timestamp, p.value)).collect()
    }

    /// Treat every point as an observation again.
    pub fn to_series(&self) -> Series {
        let records = self
            .points
            .iter()
            .map(|p| TimestampedRecord {
                timestamp: p.timestamp,
                value: Some(p.value),
                layout: p.layout,
            })
            .collect();
        // grid points are strictly increasing by construction
        Series::new(records).unwrap_or_default()
    }

    /// Two-column output table: `DateTime`, `Balance`.
    pub fn to_table(&self) -> RawTable {
        RawTable::new(
            vec!["DateTime".to_string(), "Balance".to_string()],
            self.points
                .iter()
                .map(|p| vec![p.layout.format(&p.timestamp), p.value.to_string()])
                .collect(),
        )
    }
}

/// Left-join `series` onto its own grid and forward-fill the gaps.
///
/// Records that do not sit on a grid point are ignored and reported as off-grid.
pub fn regularize(
    series: &Series,
    cadence: Cadence,
    diagnostics: &mut Diagnostics,
) -> Result<RegularizedSeries, RegularizeError> {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return Err(RegularizeError::EmptySeries);
    };
    let grid = Grid::spanning(first.timestamp, last.timestamp, cadence);

    let mut records = series.records().iter().peekable();
    let mut carried: Option<(Decimal, TimestampLayout)> = None;
    let mut points = Vec::with_capacity(grid.len());

    for ts in grid.iter() {
        let mut hit: Option<&TimestampedRecord> = None;
        while let Some(record) = records.next_if(|r| r.timestamp <= ts) {
            if record.timestamp == ts {
                hit = Some(record);
            } else {
                diagnostics.push(Diagnostic::OffGrid {
                    timestamp: record.timestamp,
                });
            }
        }

        let observed = hit.and_then(|r| r.value.map(|v| (v, r.layout)));
        let point = match (observed, carried) {
            (Some((value, layout)), _) => GridPoint {
                timestamp: ts,
                value,
                layout,
                imputed: false,
            },
            (None, Some((value, layout))) => GridPoint {
                timestamp: ts,
                value,
                layout: hit.map_or(layout, |r| r.layout),
                imputed: true,
            },
            (None, None) => return Err(RegularizeError::NoLeadingValue { timestamp: ts }),
        };
        carried = Some((point.value, point.layout));
        points.push(point);
    }

    let out = RegularizedSeries { points, cadence };
    debug!(
        points = out.len(),
        observed = series.len(),
        imputed = out.imputed(),
        "series regularized"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use proptest::prelude::*;
    use std::str::FromStr;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 12, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn series(points: &[(NaiveDateTime, Option<&str>)]) -> Series {
        Series::new(
            points
                .iter()
                .map(|(t, v)| TimestampedRecord {
                    timestamp: *t,
                    value: v.map(dec),
                    layout: TimestampLayout::DOTTED,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn fills_gaps_forward() {
        let s = series(&[
            (at(10, 0), Some("100.5")),
            (at(10, 45), Some("99")),
            (at(11, 15), Some("98.25")),
        ]);
        let mut diags = Diagnostics::new();
        let r = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut diags).unwrap();

        assert_eq!(
            r.pairs(),
            vec![
                (at(10, 0), dec("100.5")),
                (at(10, 15), dec("100.5")),
                (at(10, 30), dec("100.5")),
                (at(10, 45), dec("99")),
                (at(11, 0), dec("99")),
                (at(11, 15), dec("98.25")),
            ]
        );
        assert_eq!(r.imputed(), 3);
        assert!(!r.points()[0].imputed);
        assert!(diags.is_empty());
    }

    #[test]
    fn missing_observed_value_is_carried_over() {
        let s = series(&[(at(10, 0), Some("1")), (at(10, 15), None), (at(10, 30), Some("3"))]);
        let r = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new()).unwrap();
        assert_eq!(r.points()[1].value, dec("1"));
        assert!(r.points()[1].imputed);
    }

    #[test]
    fn empty_series_fails() {
        let err = regularize(&Series::default(), Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new())
            .unwrap_err();
        assert_eq!(err, RegularizeError::EmptySeries);
    }

    #[test]
    fn leading_missing_value_fails() {
        let s = series(&[(at(10, 0), None), (at(10, 15), Some("2"))]);
        let err = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new()).unwrap_err();
        assert_eq!(err, RegularizeError::NoLeadingValue { timestamp: at(10, 0) });
    }

    #[test]
    fn off_grid_records_are_reported() {
        let s = series(&[(at(10, 0), Some("1")), (at(10, 7), Some("5")), (at(10, 30), Some("3"))]);
        let mut diags = Diagnostics::new();
        let r = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut diags).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.points()[1].value, dec("1"));
        assert_eq!(diags.summary().off_grid, 1);
    }

    #[test]
    fn table_preserves_layout_and_scale() {
        let s = series(&[(at(10, 0), Some("100.50")), (at(10, 30), Some("7"))]);
        let table = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new())
            .unwrap()
            .to_table();
        assert_eq!(table.headers, vec!["DateTime", "Balance"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["2023.12.01 10:00".to_string(), "100.50".to_string()],
                vec!["2023.12.01 10:15".to_string(), "100.50".to_string()],
                vec!["2023.12.01 10:30".to_string(), "7".to_string()],
            ]
        );
    }

    fn arb_series() -> impl Strategy<Value = Series> {
        prop::collection::btree_map(0u32..400, -10_000i64..10_000, 1..40).prop_map(|m| {
            let base = at(0, 0);
            Series::new(
                m.into_iter()
                    .map(|(slot, cents)| TimestampedRecord {
                        timestamp: base + Duration::minutes(i64::from(slot) * 15),
                        value: Some(Decimal::new(cents, 2)),
                        layout: TimestampLayout::DOTTED,
                    })
                    .collect(),
            )
            .unwrap()
        })
    }

    proptest! {
        #[test]
        fn grid_is_complete_and_evenly_spaced(s in arb_series()) {
            let r = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new()).unwrap();
            let first = s.first().unwrap().timestamp;
            let last = s.last().unwrap().timestamp;
            let expected = 1 + ((last - first).num_minutes() / 15) as usize;
            prop_assert_eq!(r.len(), expected);
            for w in r.points().windows(2) {
                prop_assert_eq!(w[1].timestamp - w[0].timestamp, Duration::minutes(15));
            }
            prop_assert!(r.points().iter().all(|p| p.timestamp.minute() % 15 == 0));
        }

        #[test]
        fn forward_fill_uses_nearest_observation(s in arb_series()) {
            let r = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new()).unwrap();
            prop_assert!(!r.points()[0].imputed);
            let mut last_observed = None;
            for p in r.points() {
                let observed = s.records().iter().find(|rec| rec.timestamp == p.timestamp);
                match observed {
                    Some(rec) => {
                        prop_assert!(!p.imputed);
                        prop_assert_eq!(Some(p.value), rec.value);
                        last_observed = rec.value;
                    }
                    None => {
                        prop_assert!(p.imputed);
                        prop_assert_eq!(Some(p.value), last_observed);
                    }
                }
            }
        }

        #[test]
        fn regularize_is_idempotent(s in arb_series()) {
            let once = regularize(&s, Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new()).unwrap();
            let twice = regularize(&once.to_series(), Cadence::FIFTEEN_MINUTES, &mut Diagnostics::new()).unwrap();
            prop_assert_eq!(once.pairs(), twice.pairs());
            prop_assert_eq!(twice.imputed(), 0);
        }
    }
}
