use chrono::NaiveDateTime;
use std::fmt;

use crate::error::ParseError;
use crate::process::classify::StructuralReason;

/// One row-level event that was recovered locally rather than failing the batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Row filtered out as noise.
    Structural { row: usize, reason: StructuralReason },
    /// Row dropped because its timestamp did not parse.
    UnparsableTimestamp { row: usize, error: ParseError },
    /// Balance cell did not parse; the record keeps a missing value.
    MissingValue { row: usize, error: ParseError },
    /// Row rounded onto a timestamp already taken by an earlier row.
    DuplicateTimestamp { row: usize, timestamp: NaiveDateTime },
    /// Record between grid points, ignored by the left join.
    OffGrid { timestamp: NaiveDateTime },
    /// Merge key cell did not parse; the row was left out of the join.
    UnparsableKey {
        side: &'static str,
        row: usize,
        error: ParseError,
    },
    /// Secondary table repeats a key; only the first row takes part in the join.
    DuplicateKey { row: usize, timestamp: NaiveDateTime },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Structural { row, reason } => write!(f, "row {row}: skipped ({reason})"),
            Diagnostic::UnparsableTimestamp { row, error } => write!(f, "row {row}: dropped, {error}"),
            Diagnostic::MissingValue { row, error } => write!(f, "row {row}: missing value, {error}"),
            Diagnostic::DuplicateTimestamp { row, timestamp } => {
                write!(f, "row {row}: duplicate of {timestamp}, dropped")
            }
            Diagnostic::OffGrid { timestamp } => write!(f, "{timestamp} is off the grid, ignored"),
            Diagnostic::UnparsableKey { side, row, error } => {
                write!(f, "{side} row {row}: dropped from join, {error}")
            }
            Diagnostic::DuplicateKey { row, timestamp } => {
                write!(f, "secondary row {row}: duplicate key {timestamp}, ignored")
            }
        }
    }
}

/// Per-kind counts, handy for a one-line log summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiagnosticSummary {
    pub structural: usize,
    pub unparsable_timestamps: usize,
    pub missing_values: usize,
    pub duplicates: usize,
    pub off_grid: usize,
    pub unparsable_keys: usize,
}

/// Diagnostics collected during one pipeline run and returned with its result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> DiagnosticSummary {
        let mut s = DiagnosticSummary::default();
        for d in &self.entries {
            match d {
                Diagnostic::Structural { .. } => s.structural += 1,
                Diagnostic::UnparsableTimestamp { .. } => s.unparsable_timestamps += 1,
                Diagnostic::MissingValue { .. } => s.missing_values += 1,
                Diagnostic::DuplicateTimestamp { .. } | Diagnostic::DuplicateKey { .. } => {
                    s.duplicates += 1
                }
                Diagnostic::OffGrid { .. } => s.off_grid += 1,
                Diagnostic::UnparsableKey { .. } => s.unparsable_keys += 1,
            }
        }
        s
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
