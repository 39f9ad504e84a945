use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::io::Cursor;

/// Every comma-separated record as a row of cells. Rows may have different lengths.
pub fn read_lines(text: &str) -> Result<Vec<Vec<String>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(text.as_bytes()));

    let mut lines = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("parsing CSV record {}", i))?;
        lines.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(lines)
}
