// src/staging.rs

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// An uploaded or piped source parked on disk under its original name's
/// extension. The file is removed when this value is dropped, on every path.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
    original_name: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name the caller gave the source; merge compatibility is judged on this,
    /// not on the temporary path.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }
}

pub fn stage_bytes(bytes: &[u8], original_name: &str) -> Result<StagedFile> {
    let suffix = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let mut file = tempfile::Builder::new()
        .prefix("ledgergrid-")
        .suffix(&suffix)
        .tempfile()
        .context("creating staging file")?;
    file.write_all(bytes).context("writing staging file")?;
    file.flush()?;

    debug!(name = original_name, path = %file.path().display(), bytes = bytes.len(), "staged");
    Ok(StagedFile {
        file,
        original_name: original_name.to_string(),
    })
}

pub fn stage_reader<R: Read>(mut reader: R, original_name: &str) -> Result<StagedFile> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading {}", original_name))?;
    stage_bytes(&bytes, original_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildError, EngineError};
    use crate::ingest::load_table;
    use crate::{regularize_table, EngineConfig, Regularized};
    use std::io::Cursor;
    use std::path::PathBuf;

    /// Stage, parse and regularize an upload; the staged path is handed back
    /// through `seen` so the caller can check it after the scope ends.
    fn regularize_upload(
        bytes: &[u8],
        name: &str,
        seen: &mut Option<PathBuf>,
    ) -> Result<Regularized> {
        let staged = stage_bytes(bytes, name)?;
        *seen = Some(staged.path().to_path_buf());
        let table = load_table(staged.path(), false)?;
        Ok(regularize_table(&table, &EngineConfig::default())?)
    }

    #[test]
    fn staged_file_keeps_extension_and_is_removed() -> Result<()> {
        let staged = stage_bytes(b"<table><tr><td>a</td></tr></table>", "H1_CT3_Pd2.html")?;
        let path = staged.path().to_path_buf();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("html"));
        assert_eq!(staged.original_name(), "H1_CT3_Pd2.html");

        let table = load_table(&path, false)?;
        assert_eq!(table.rows, vec![vec!["a"]]);

        drop(staged);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn staged_file_is_removed_when_processing_fails() {
        let mut seen = None;
        let err = regularize_upload(b"not,a,report\n1,2,3\n", "H1_CT3_Pd2.csv", &mut seen)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Build(BuildError::NoDataRegion { .. }))
        ));

        let path = seen.expect("file was staged");
        assert!(!path.exists());
    }

    #[test]
    fn staging_from_reader() -> Result<()> {
        let staged = stage_reader(Cursor::new("a,b\n"), "-")?;
        assert_eq!(std::fs::read_to_string(staged.path())?, "a,b\n");
        Ok(())
    }
}
