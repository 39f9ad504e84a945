// src/process/merge.rs

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{CompatibilityError, MergeError};
use crate::process::date_parser::{parse_timestamp, ParsedStamp};
use crate::process::diagnostics::{Diagnostic, Diagnostics};
use crate::process::grid::RegularizedSeries;
use crate::process::raw_table::RawTable;

/// Default identity grammar: a source-type prefix, then `CT<n>_Pd<n>`.
pub const DEFAULT_IDENTITY_PATTERN: &str = r"(?:H1|G2).*?(CT\d+)_(Pd\d+)";

static DEFAULT_IDENTITY: Lazy<IdentityPattern> = Lazy::new(|| {
    IdentityPattern::new(DEFAULT_IDENTITY_PATTERN).expect("default identity pattern is valid")
});

/// Category and sub-code tokens taken from a file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    pub category: String,
    pub subcode: String,
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.category, self.subcode)
    }
}

/// Regex with two capture groups: category, then sub-code.
#[derive(Clone, Debug)]
pub struct IdentityPattern {
    regex: Regex,
}

impl IdentityPattern {
    pub fn new(pattern: &str) -> Result<Self, CompatibilityError> {
        let regex = Regex::new(pattern).map_err(|e| CompatibilityError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() < 3 {
            return Err(CompatibilityError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "needs two capture groups (category, subcode)".into(),
            });
        }
        Ok(Self { regex })
    }

    pub fn extract(&self, name: &str) -> Option<SourceIdentity> {
        let caps = self.regex.captures(name)?;
        Some(SourceIdentity {
            category: caps.get(1)?.as_str().to_string(),
            subcode: caps.get(2)?.as_str().to_string(),
        })
    }

    /// Both names must yield tokens and the tokens must agree.
    pub fn check(&self, primary: &str, secondary: &str) -> Result<SourceIdentity, CompatibilityError> {
        let a = self
            .extract(primary)
            .ok_or_else(|| CompatibilityError::MissingTokens {
                name: primary.to_string(),
            })?;
        let b = self
            .extract(secondary)
            .ok_or_else(|| CompatibilityError::MissingTokens {
                name: secondary.to_string(),
            })?;
        if a != b {
            return Err(CompatibilityError::Mismatch {
                primary: a.to_string(),
                secondary: b.to_string(),
            });
        }
        Ok(a)
    }
}

impl Default for IdentityPattern {
    fn default() -> Self {
        DEFAULT_IDENTITY.clone()
    }
}

/// True when both names carry the same identity tokens under the default grammar.
pub fn validate_compatibility(primary: &str, secondary: &str) -> bool {
    match DEFAULT_IDENTITY.check(primary, secondary) {
        Ok(_) => true,
        Err(e) => {
            warn!(%e, "sources are not compatible");
            false
        }
    }
}

/// Name for a merged file: `prefix` + the primary stem's tokens after its own
/// prefix + the first secondary token starting with `carry_prefix`.
///
/// `H1_CT3_Pd2.csv` + `G2_CT3_Pd2_FIr1-2.csv` → `H4_CT3_Pd2_FIr1-2.csv`
pub fn merged_file_name(primary: &str, secondary: &str, prefix: &str, carry_prefix: &str) -> String {
    let stem = |name: &str| {
        Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
            .to_string()
    };
    let primary_stem = stem(primary);
    let secondary_stem = stem(secondary);

    let mut parts: Vec<&str> = vec![prefix];
    parts.extend(primary_stem.split('_').skip(1));
    if let Some(carried) = secondary_stem
        .split('_')
        .find(|p| !carry_prefix.is_empty() && p.starts_with(carry_prefix))
    {
        parts.push(carried);
    }
    format!("{}.csv", parts.join("_"))
}

/// A table whose key column has been turned into instants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyedTable {
    headers: Vec<String>,
    key_index: usize,
    keys: Vec<ParsedStamp>,
    /// Row cells, padded or cut to the header width.
    rows: Vec<Vec<String>>,
    /// Source row index of each kept row.
    origins: Vec<usize>,
}

impl KeyedTable {
    /// Parse `key_column` of `table`; rows whose key does not parse are left out.
    pub fn parse(
        table: &RawTable,
        key_column: &str,
        side: &'static str,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, MergeError> {
        let key_index =
            table
                .column_index(key_column)
                .ok_or_else(|| MergeError::MissingKeyColumn {
                    side,
                    column: key_column.to_string(),
                    available: table.headers.join(", "),
                })?;
        let width = table.headers.len();

        let mut keys = Vec::with_capacity(table.rows.len());
        let mut rows = Vec::with_capacity(table.rows.len());
        let mut origins = Vec::with_capacity(table.rows.len());
        for (i, row) in table.rows.iter().enumerate() {
            let text = row.get(key_index).map(String::as_str).unwrap_or_default();
            match parse_timestamp(text) {
                Ok(stamp) => {
                    let mut cells = row.clone();
                    cells.resize(width, String::new());
                    keys.push(stamp);
                    rows.push(cells);
                    origins.push(i);
                }
                Err(error) => diagnostics.push(Diagnostic::UnparsableKey { side, row: i, error }),
            }
        }

        Ok(Self {
            headers: table.headers.clone(),
            key_index,
            keys,
            rows,
            origins,
        })
    }

    /// Use an already-regularized series as-is: its instants are not re-parsed.
    pub fn from_regularized(series: &RegularizedSeries) -> Self {
        let table = series.to_table();
        let keys = series
            .points()
            .iter()
            .map(|p| ParsedStamp::new(p.timestamp, p.layout))
            .collect();
        Self {
            headers: table.headers,
            key_index: 0,
            keys,
            origins: (0..table.rows.len()).collect(),
            rows: table.rows,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn non_key_headers(&self) -> impl Iterator<Item = &String> + '_ {
        self.headers
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.key_index)
            .map(|(_, h)| h)
    }

    fn non_key_cells(&self, row: usize) -> Vec<String> {
        let width = self.headers.len();
        self.rows[row]
            .iter()
            .take(width)
            .enumerate()
            .filter(|(i, _)| *i != self.key_index)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

/// One output row: the primary's cells plus the secondary's non-key cells when
/// an exact key match exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedRow {
    pub key: ParsedStamp,
    pub primary: Vec<String>,
    pub secondary: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedTable {
    headers: Vec<String>,
    key_index: usize,
    secondary_width: usize,
    rows: Vec<MergedRow>,
}

impl MergedTable {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn matched(&self) -> usize {
        self.rows.iter().filter(|r| r.secondary.is_some()).count()
    }

    /// Text table with the key column re-serialized in each row's own layout and
    /// absent secondary cells left empty.
    pub fn to_table(&self) -> RawTable {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut cells = r.primary.clone();
                if let Some(cell) = cells.get_mut(self.key_index) {
                    *cell = r.key.render();
                }
                match &r.secondary {
                    Some(extra) => cells.extend(extra.iter().cloned()),
                    None => cells.extend(std::iter::repeat(String::new()).take(self.secondary_width)),
                }
                cells
            })
            .collect();
        RawTable::new(self.headers.clone(), rows)
    }
}

/// Left outer join on the primary's key instants (exact match, no rounding),
/// sorted ascending by key.
pub fn merge_keyed(
    primary: &KeyedTable,
    secondary: &KeyedTable,
    diagnostics: &mut Diagnostics,
) -> Result<MergedTable, MergeError> {
    let mut lookup: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(secondary.len());
    for (i, key) in secondary.keys.iter().enumerate() {
        if lookup.contains_key(&key.instant) {
            diagnostics.push(Diagnostic::DuplicateKey {
                row: secondary.origins[i],
                timestamp: key.instant,
            });
        } else {
            lookup.insert(key.instant, i);
        }
    }

    // colliding names from the secondary side get a `_y` suffix
    let taken: HashSet<&str> = primary.headers.iter().map(String::as_str).collect();
    let secondary_headers: Vec<String> = secondary
        .non_key_headers()
        .map(|h| {
            if taken.contains(h.as_str()) {
                format!("{h}_y")
            } else {
                h.clone()
            }
        })
        .collect();
    let secondary_width = secondary_headers.len();
    let mut headers = primary.headers.clone();
    headers.extend(secondary_headers);

    let mut rows: Vec<MergedRow> = primary
        .keys
        .iter()
        .zip(&primary.rows)
        .map(|(key, cells)| MergedRow {
            key: *key,
            primary: cells.clone(),
            secondary: lookup
                .get(&key.instant)
                .map(|&j| secondary.non_key_cells(j)),
        })
        .collect();

    if rows.is_empty() {
        return Err(MergeError::EmptyResult);
    }
    rows.sort_by_key(|r| r.key.instant);

    let merged = MergedTable {
        headers,
        key_index: primary.key_index,
        secondary_width,
        rows,
    };
    debug!(rows = merged.len(), matched = merged.matched(), "tables merged");
    Ok(merged)
}

/// Parse both key columns, then join.
pub fn merge_tables(
    primary: &RawTable,
    secondary: &RawTable,
    primary_key: &str,
    secondary_key: &str,
    diagnostics: &mut Diagnostics,
) -> Result<MergedTable, MergeError> {
    let a = KeyedTable::parse(primary, primary_key, "primary", diagnostics)?;
    let b = KeyedTable::parse(secondary, secondary_key, "secondary", diagnostics)?;
    merge_keyed(&a, &b, diagnostics)
}

/// Check the sources' identity tokens first and refuse to touch the data when
/// they disagree.
#[tracing::instrument(level = "info", skip(primary, secondary, pattern, diagnostics))]
pub fn merge_sources(
    primary_name: &str,
    primary: &RawTable,
    secondary_name: &str,
    secondary: &RawTable,
    pattern: &IdentityPattern,
    keys: (&str, &str),
    diagnostics: &mut Diagnostics,
) -> Result<MergedTable, MergeError> {
    let identity = pattern.check(primary_name, secondary_name)?;
    info!(%identity, "sources compatible");
    merge_tables(primary, secondary, keys.0, keys.1, diagnostics)
}
