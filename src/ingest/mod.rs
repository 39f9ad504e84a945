// src/ingest/mod.rs

pub mod delimited;
pub mod html;

use anyhow::{Context, Result};
use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use std::{fs, path::Path};
use tracing::{debug, warn};

use crate::process::RawTable;

/// How the bytes of a source are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceFormat {
    Delimited,
    Html,
}

impl SourceFormat {
    /// By extension; anything that is not `.html`/`.htm` is read as delimited text.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("html") | Some("htm") => SourceFormat::Html,
            _ => SourceFormat::Delimited,
        }
    }

    /// Extension that `from_path` maps back to this format.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Delimited => "csv",
            SourceFormat::Html => "html",
        }
    }
}

/// Bytes → text.
///
/// 1) a UTF-8 or UTF-16 byte-order mark picks the encoding
/// 2) otherwise valid UTF-8 is taken as is
/// 3) otherwise the bytes are read as Shift_JIS (CP932), the platform's legacy
///    Japanese export encoding
pub fn decode(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        return decode_with(encoding, &bytes[bom_len..]);
    }
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }
    warn!("input is not valid UTF-8, decoding as Shift_JIS");
    decode_with(SHIFT_JIS, bytes)
}

fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        warn!(encoding = encoding.name(), "undecodable bytes replaced");
    }
    text.into_owned()
}

/// Parse an in-memory source.
pub fn load_bytes(bytes: &[u8], format: SourceFormat, has_headers: bool) -> Result<RawTable> {
    let text = decode(bytes);
    let lines = match format {
        SourceFormat::Delimited => delimited::read_lines(&text)?,
        SourceFormat::Html => html::read_lines(&text)?,
    };
    debug!(?format, lines = lines.len(), "source parsed");
    Ok(RawTable::from_lines(lines, has_headers))
}

/// Read and parse a file, picking the format from its extension.
pub fn load_table(path: &Path, has_headers: bool) -> Result<RawTable> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    load_bytes(&bytes, SourceFormat::from_path(path), has_headers)
        .with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnsConfig;
    use crate::{regularize_table, EngineConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn format_from_extension() {
        assert_eq!(SourceFormat::from_path(Path::new("r.HTM")), SourceFormat::Html);
        assert_eq!(SourceFormat::from_path(Path::new("r.csv")), SourceFormat::Delimited);
        assert_eq!(SourceFormat::from_path(Path::new("noext")), SourceFormat::Delimited);
        for format in [SourceFormat::Delimited, SourceFormat::Html] {
            let name = format!("stdin.{}", format.extension());
            assert_eq!(SourceFormat::from_path(Path::new(&name)), format);
        }
    }

    #[test]
    fn decode_handles_boms() {
        assert_eq!(decode(b"\xEF\xBB\xBFa,b"), "a,b");
        let utf16: Vec<u8> = [0xFF, 0xFE]
            .into_iter()
            .chain("時間".encode_utf16().flat_map(|u| u.to_le_bytes()))
            .collect();
        assert_eq!(decode(&utf16), "時間");
        let utf16be: Vec<u8> = [0xFE, 0xFF]
            .into_iter()
            .chain("残高".encode_utf16().flat_map(|u| u.to_be_bytes()))
            .collect();
        assert_eq!(decode(&utf16be), "残高");
    }

    #[test]
    fn non_utf8_falls_back_to_shift_jis() {
        // 時間,残高 in CP932
        let bytes = b"\x8E\x9E\x8A\xD4,\x8E\x63\x8D\x82";
        assert!(std::str::from_utf8(bytes).is_err());
        assert_eq!(decode(bytes), "時間,残高");
        assert_eq!(decode(b"ok\xFF"), "ok\u{FFFD}");
    }

    #[test]
    fn shift_jis_export_regularizes() -> Result<()> {
        let (bytes, _, unmappable) =
            SHIFT_JIS.encode("時間,残高\n2023.12.01 10:07,100.5 \n2023.12.01 10:22,101.0\n");
        assert!(!unmappable);

        let table = load_bytes(&bytes, SourceFormat::Delimited, false)?;
        assert_eq!(table.rows[0], vec!["時間", "残高"]);

        let config = EngineConfig {
            columns: ColumnsConfig {
                time: 0,
                balance: 1,
                drop: vec![],
            },
            ..EngineConfig::default()
        };
        let out = regularize_table(&table, &config)?;
        assert_eq!(
            out.series.to_table().rows,
            vec![
                vec!["2023.12.01 10:00", "100.5"],
                vec!["2023.12.01 10:15", "101.0"],
            ]
        );
        Ok(())
    }

    #[test]
    fn loads_csv_file_with_headers() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        write!(file, "\u{FEFF}Time,Signal\n2023.12.01 10:00,buy\n")?;
        let table = load_table(file.path(), true)?;
        assert_eq!(table.headers, vec!["Time", "Signal"]);
        assert_eq!(table.rows, vec![vec!["2023.12.01 10:00", "buy"]]);
        Ok(())
    }

    #[test]
    fn html_bytes_are_read_as_tables() -> Result<()> {
        let table = load_bytes(
            b"<html><table><tr><td>x</td></tr></table></html>",
            SourceFormat::Html,
            false,
        )?;
        assert_eq!(table.rows, vec![vec!["x"]]);
        Ok(())
    }

    #[test]
    fn missing_file_names_path() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        drop(file);
        let err = load_table(&path, false).unwrap_err();
        assert!(format!("{err:#}").contains(&path.display().to_string()));
    }
}
