// src/process/mod.rs

pub mod classify;
pub mod convert;
pub mod date_parser;
pub mod diagnostics;
pub mod grid;
pub mod merge;
pub mod raw_table;
pub mod series;
pub mod utils;

use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineError;
use classify::{slice_data_region, DataRegion, RowClass, RowClassifier};
use diagnostics::{Diagnostic, Diagnostics};
use grid::{regularize, RegularizedSeries};
use merge::{merge_sources, merged_file_name, MergedTable};
use series::SeriesBuilder;

pub use raw_table::{IndexedRow, RawTable};

/// Result of the primary pipeline, with everything that was recovered on the way.
#[derive(Clone, Debug)]
pub struct Regularized {
    pub series: RegularizedSeries,
    pub region: DataRegion,
    pub diagnostics: Diagnostics,
}

/// raw table → data region → row classification → series → grid.
#[tracing::instrument(level = "info", skip(table, config), fields(lines = table.rows.len()))]
pub fn regularize_table(table: &RawTable, config: &EngineConfig) -> Result<Regularized, EngineError> {
    // 1) Resolve configuration up front so a bad config fails before any work
    let cadence = config.cadence()?;
    let plan = config.column_plan()?;
    let (same_row, lookahead) = config.locators();

    // 2) Locate the data region
    let lines = table.lines();
    let region = slice_data_region(&lines, &[&same_row, &lookahead], &config.end_marker)?;

    // 3) Classify rows inside the region, reduce the survivors' columns
    let classifier = RowClassifier::new(
        plan.time_col(),
        &config.end_marker,
        config.summary_marker.as_deref(),
    )
    .with_header(&region.header);

    let mut diagnostics = Diagnostics::new();
    let mut data: Vec<IndexedRow> = Vec::with_capacity(region.len());
    for (index, row) in lines
        .iter()
        .enumerate()
        .take(region.end)
        .skip(region.start)
    {
        match classifier.classify(row) {
            RowClass::Data => data.push(IndexedRow::new(index, plan.reduce(row))),
            RowClass::Structural(reason) => {
                diagnostics.push(Diagnostic::Structural { row: index, reason })
            }
        }
    }

    // 4) Project onto (time, balance) and build the series
    let (time_col, balance_col) = plan.projection();
    let series = SeriesBuilder::new(time_col, balance_col, cadence).build(&data, &mut diagnostics)?;

    // 5) Fill the grid
    let series = regularize(&series, cadence, &mut diagnostics)?;

    let summary = diagnostics.summary();
    info!(
        strategy = region.strategy,
        points = series.len(),
        imputed = series.imputed(),
        skipped = summary.structural,
        dropped = summary.unparsable_timestamps,
        duplicates = summary.duplicates,
        "table regularized"
    );

    Ok(Regularized {
        series,
        region,
        diagnostics,
    })
}

/// Result of the merge pipeline.
#[derive(Clone, Debug)]
pub struct Merged {
    pub table: MergedTable,
    /// Suggested output file name derived from both source names.
    pub file_name: String,
    pub diagnostics: Diagnostics,
}

/// Compatibility check → key parse → left join → sort, driven by `config.merge`.
pub fn merge_named_tables(
    primary_name: &str,
    primary: &RawTable,
    secondary_name: &str,
    secondary: &RawTable,
    config: &EngineConfig,
) -> Result<Merged, EngineError> {
    let pattern = config.identity_pattern()?;
    let mut diagnostics = Diagnostics::new();
    let table = merge_sources(
        primary_name,
        primary,
        secondary_name,
        secondary,
        &pattern,
        (&config.merge.primary_key, &config.merge.secondary_key),
        &mut diagnostics,
    )?;

    let file_name = merged_file_name(
        primary_name,
        secondary_name,
        &config.merge.output_prefix,
        &config.merge.carry_prefix,
    );
    info!(
        rows = table.len(),
        matched = table.matched(),
        file_name = %file_name,
        "merge complete"
    );

    Ok(Merged {
        table,
        file_name,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnsConfig;
    use crate::error::{BuildError, MergeError, CompatibilityError};
    use classify::StructuralReason;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,ledgergrid::process=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn strs(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn two_column_config() -> EngineConfig {
        EngineConfig {
            columns: ColumnsConfig {
                time: 0,
                balance: 1,
                drop: vec![],
            },
            ..EngineConfig::default()
        }
    }

    /// 13-column deal row with time in 0 and balance in 11.
    fn deal(time: &str, kind: &str, balance: &str) -> Vec<String> {
        let mut row = vec![String::new(); 13];
        row[0] = time.into();
        row[1] = "1001".into();
        row[3] = kind.into();
        row[11] = balance.into();
        row[12] = "comment".into();
        row
    }

    #[test]
    fn two_rows_end_to_end() {
        init_test_logging();
        let table = RawTable::from_lines(
            vec![
                strs(&["時間", "残高"]),
                strs(&["2023.12.01 10:07", "100.5 "]),
                strs(&["2023.12.01 10:22", "101.0"]),
            ],
            false,
        );
        let out = regularize_table(&table, &two_column_config()).unwrap();
        assert_eq!(
            out.series.to_table().rows,
            vec![
                strs(&["2023.12.01 10:00", "100.5"]),
                strs(&["2023.12.01 10:15", "101.0"]),
            ]
        );
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn deal_export_end_to_end() {
        init_test_logging();
        let mut header = deal("時間", "タイプ", "残高");
        header[1] = "約定".into();
        let lines = vec![
            strs(&["ストラテジーテスター レポート"]),
            strs(&[""]),
            header.clone(),
            deal("2023.12.01 10:00", "balance", "10 000.00"),
            deal("2023.12.01 10:01", "buy", "10 000.00"),
            deal("2023.12.01 10:44", "sell", "10 250.50"),
            header,
            deal("", "", ""),
            deal("2023.12.01 11:31", "sell", "9 990.00"),
            strs(&["end of test"]),
            deal("2023.12.01 12:00", "sell", "1"),
        ];
        let table = RawTable::from_lines(lines, false);

        let out = regularize_table(&table, &EngineConfig::default()).unwrap();
        assert_eq!(out.region.strategy, "same-row labels");
        assert_eq!((out.region.start, out.region.end), (3, 10));
        assert_eq!(
            out.series.to_table().rows,
            vec![
                strs(&["2023.12.01 10:00", "10000.00"]),
                strs(&["2023.12.01 10:15", "10000.00"]),
                strs(&["2023.12.01 10:30", "10000.00"]),
                strs(&["2023.12.01 10:45", "10250.50"]),
                strs(&["2023.12.01 11:00", "10250.50"]),
                strs(&["2023.12.01 11:15", "10250.50"]),
                strs(&["2023.12.01 11:30", "9990.00"]),
            ]
        );

        let reasons: Vec<StructuralReason> = out
            .diagnostics
            .iter()
            .filter_map(|d| match d {
                Diagnostic::Structural { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                StructuralReason::SummaryMarker,
                StructuralReason::RepeatedHeader,
                StructuralReason::BlankTime,
                StructuralReason::EndMarker,
            ]
        );
    }

    #[test]
    fn unrecognised_table_is_a_build_error() {
        let table = RawTable::from_lines(vec![strs(&["a", "b"])], false);
        let err = regularize_table(&table, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::Build(BuildError::NoDataRegion { .. })));
    }

    #[test]
    fn only_bad_rows_is_an_empty_series() {
        let table = RawTable::from_lines(
            vec![strs(&["時間", "残高"]), strs(&["yesterday", "1"])],
            false,
        );
        let err = regularize_table(&table, &two_column_config()).unwrap_err();
        assert_eq!(err, EngineError::Build(BuildError::EmptySeries { dropped: 1 }));
    }

    #[test]
    fn merge_pipeline_names_output() {
        let primary = RawTable::new(
            strs(&["時間", "残高"]),
            vec![strs(&["2023.12.01 10:00:00", "1"])],
        );
        let secondary = RawTable::new(
            strs(&["Time", "Signal"]),
            vec![strs(&["2023.12.01 10:00", "buy"])],
        );
        let merged = merge_named_tables(
            "H1_CT3_Pd2.csv",
            &primary,
            "G2_CT3_Pd2_FIr2-5.csv",
            &secondary,
            &EngineConfig::default(),
        )
        .unwrap();
        assert_eq!(merged.file_name, "H4_CT3_Pd2_FIr2-5.csv");
        assert_eq!(
            merged.table.to_table().rows,
            vec![strs(&["2023.12.01 10:00:00", "1", "buy"])]
        );

        let err = merge_named_tables(
            "H1_CT3_Pd2.csv",
            &primary,
            "G2_CT5_Pd2.csv",
            &secondary,
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Merge(MergeError::Incompatible(CompatibilityError::Mismatch { .. }))
        ));
    }
}
