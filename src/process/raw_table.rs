/// A rectangular-ish table of text cells as handed over by ingestion.
///
/// Rows may be ragged; nothing here assumes a fixed column count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Column labels. Empty when the source was read without a header row.
    pub headers: Vec<String>,
    /// Each data row, one `String` per field.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Build from a list of lines, promoting the first to headers when asked.
    pub fn from_lines(mut lines: Vec<Vec<String>>, has_headers: bool) -> Self {
        if has_headers && !lines.is_empty() {
            let headers = lines.remove(0);
            Self::new(headers, lines)
        } else {
            Self::new(Vec::new(), lines)
        }
    }

    /// Every line in source order, the header line first when present.
    pub fn lines(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        if !self.headers.is_empty() {
            out.push(self.headers.clone());
        }
        out.extend(self.rows.iter().cloned());
        out
    }

    /// Position of the header whose trimmed text equals `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name.trim())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A row together with its position in the source table, kept so diagnostics can
/// point back at the offending line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedRow {
    pub index: usize,
    pub cells: Vec<String>,
}

impl IndexedRow {
    pub fn new(index: usize, cells: Vec<String>) -> Self {
        Self { index, cells }
    }

    pub fn cell(&self, col: usize) -> Option<&str> {
        self.cells.get(col).map(String::as_str)
    }
}
