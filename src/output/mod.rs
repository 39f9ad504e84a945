// src/output/mod.rs

use anyhow::{anyhow, Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::{
    arrow::ArrowWriter,
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;

use crate::process::convert::{regularized_to_batch, table_to_batch};
use crate::process::grid::RegularizedSeries;
use crate::process::RawTable;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => OutputFormat::Parquet,
            _ => OutputFormat::Csv,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// `<dir>/<stem>_BD.<ext>` next to the input.
pub fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    input.with_file_name(format!("{}_BD.{}", stem, format.extension()))
}

/// Merged output next to the primary source, named `file_name` but carrying the
/// extension of the format actually written.
pub fn merged_output_path(primary: &Path, file_name: &str, format: OutputFormat) -> PathBuf {
    primary
        .with_file_name(file_name)
        .with_extension(format.extension())
}

/// Write to a hidden sibling, then rename over `path`.
fn write_atomically<F>(path: &Path, fill: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("output path {:?} has no file name", path))?;
    let tmp_path = dir.join(format!(".{}.tmp", name));

    let file = File::create(&tmp_path).with_context(|| format!("creating {:?}", tmp_path))?;
    let mut writer = BufWriter::new(file);
    if let Err(e) = fill(&mut writer).and_then(|_| writer.flush().map_err(Into::into)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    drop(writer);

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {:?} -> {:?}", tmp_path, path))?;
    let bytes = fs::metadata(path).context("getting file metadata")?.len();
    Ok(bytes)
}

/// CSV with a UTF-8 byte-order mark and a header row.
pub fn write_table_csv(table: &RawTable, path: &Path) -> Result<u64> {
    let bytes = write_atomically(path, |out| {
        out.write_all(UTF8_BOM)?;
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(out);
        wtr.write_record(&table.headers)?;
        for row in &table.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    })?;
    info!(path = %path.display(), rows = table.rows.len(), bytes, "wrote csv");
    Ok(bytes)
}

pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<u64> {
    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();

    let bytes = write_atomically(path, |out| {
        let mut writer = ArrowWriter::try_new(out, batch.schema(), Some(props))
            .context("creating parquet writer")?;
        writer.write(batch).context("writing batch to parquet")?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    })?;
    info!(path = %path.display(), rows = batch.num_rows(), bytes, "wrote parquet");
    Ok(bytes)
}

pub fn write_regularized(series: &RegularizedSeries, path: &Path, format: OutputFormat) -> Result<u64> {
    match format {
        OutputFormat::Csv => write_table_csv(&series.to_table(), path),
        OutputFormat::Parquet => write_parquet(&regularized_to_batch(series)?, path),
    }
}

pub fn write_table(table: &RawTable, path: &Path, format: OutputFormat) -> Result<u64> {
    match format {
        OutputFormat::Csv => write_table_csv(table, path),
        OutputFormat::Parquet => write_parquet(&table_to_batch(table)?, path),
    }
}
