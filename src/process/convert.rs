use crate::process::grid::RegularizedSeries;
use crate::process::raw_table::RawTable;
use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, StringBuilder, TimestampMillisecondBuilder},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// Schema of a regularized series: naive millisecond timestamps + f64 balance.
pub fn regularized_schema() -> Schema {
    Schema::new(vec![
        Field::new(
            "DateTime",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("Balance", DataType::Float64, false),
    ])
}

/// Typed batch for a regularized series.
pub fn regularized_to_batch(series: &RegularizedSeries) -> Result<RecordBatch> {
    let mut ts = TimestampMillisecondBuilder::with_capacity(series.len());
    let mut balance = Float64Builder::with_capacity(series.len());

    for p in series.points() {
        ts.append_value(p.timestamp.and_utc().timestamp_millis());
        let v = p
            .value
            .to_f64()
            .with_context(|| format!("balance {} at {} does not fit f64", p.value, p.timestamp))?;
        balance.append_value(v);
    }

    let cols: Vec<ArrayRef> = vec![Arc::new(ts.finish()), Arc::new(balance.finish())];
    RecordBatch::try_new(Arc::new(regularized_schema()), cols).context("building series batch")
}

/// All-string batch for an arbitrary text table (merged output). Short rows are
/// padded with nulls.
pub fn table_to_batch(table: &RawTable) -> Result<RecordBatch> {
    let fields: Vec<Field> = table
        .headers
        .iter()
        .map(|h| Field::new(h.as_str(), DataType::Utf8, true))
        .collect();

    let cols: Vec<ArrayRef> = (0..table.headers.len())
        .map(|c| {
            let mut b = StringBuilder::new();
            for row in &table.rows {
                b.append_option(row.get(c).filter(|s| !s.is_empty()));
            }
            Arc::new(b.finish()) as ArrayRef
        })
        .collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).context("building table batch")
}
