// src/process/classify.rs

use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use crate::error::{BuildError, ConfigError};
use crate::process::utils::{clean_str, is_blank};

/// Why a row was classified as noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructuralReason {
    BlankTime,
    EndMarker,
    RepeatedHeader,
    SummaryMarker,
}

impl fmt::Display for StructuralReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StructuralReason::BlankTime => "blank time cell",
            StructuralReason::EndMarker => "end-of-data marker",
            StructuralReason::RepeatedHeader => "repeated header",
            StructuralReason::SummaryMarker => "summary row",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowClass {
    Structural(StructuralReason),
    Data,
}

/// Pure row predicate: decides noise vs data from the row text and the region's
/// header, nothing else.
#[derive(Clone, Debug)]
pub struct RowClassifier {
    time_col: usize,
    end_marker: String,
    /// Lowercased once up front.
    summary_marker: Option<String>,
    header: Vec<String>,
}

impl RowClassifier {
    pub fn new(time_col: usize, end_marker: &str, summary_marker: Option<&str>) -> Self {
        Self {
            time_col,
            end_marker: end_marker.to_string(),
            summary_marker: summary_marker
                .filter(|m| !m.trim().is_empty())
                .map(|m| m.to_lowercase()),
            header: Vec::new(),
        }
    }

    /// Header label set; later rows repeating it are noise.
    pub fn with_header(mut self, header: &[String]) -> Self {
        self.header = normalized(header);
        self
    }

    pub fn classify(&self, row: &[String]) -> RowClass {
        if !self.end_marker.is_empty() && row.iter().any(|c| c.contains(&self.end_marker)) {
            return RowClass::Structural(StructuralReason::EndMarker);
        }
        if !self.header.is_empty() && normalized(row) == self.header {
            return RowClass::Structural(StructuralReason::RepeatedHeader);
        }
        if row.get(self.time_col).map_or(true, |c| is_blank(c)) {
            return RowClass::Structural(StructuralReason::BlankTime);
        }
        if let Some(marker) = &self.summary_marker {
            if row.iter().any(|c| c.to_lowercase().contains(marker.as_str())) {
                return RowClass::Structural(StructuralReason::SummaryMarker);
            }
        }
        RowClass::Data
    }

    pub fn is_structural(&self, row: &[String]) -> bool {
        matches!(self.classify(row), RowClass::Structural(_))
    }
}

/// Trimmed cells with trailing empties removed, so ragged copies of the header
/// still compare equal.
fn normalized(row: &[String]) -> Vec<String> {
    let mut cells: Vec<String> = row.iter().map(|c| clean_str(c)).collect();
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}

/// Rows `[start, end)` of the source hold observations; `header` is the matched
/// column-label row just before `start`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRegion {
    pub header: Vec<String>,
    pub start: usize,
    pub end: usize,
    pub strategy: &'static str,
}

impl DataRegion {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// One way of finding the header row that opens the data region.
pub trait RegionLocator {
    fn name(&self) -> &'static str;

    /// Index of the header row, if this layout is present.
    fn locate(&self, rows: &[Vec<String>]) -> Option<usize>;
}

/// Time label in the time column and balance label in the balance column of the
/// same row.
#[derive(Clone, Debug)]
pub struct SameRowLabels {
    pub time_col: usize,
    pub balance_col: usize,
    pub time_label: String,
    pub balance_label: String,
}

impl RegionLocator for SameRowLabels {
    fn name(&self) -> &'static str {
        "same-row labels"
    }

    fn locate(&self, rows: &[Vec<String>]) -> Option<usize> {
        rows.iter().position(|row| {
            let time_hit = row
                .get(self.time_col)
                .is_some_and(|c| c.contains(&self.time_label));
            let balance_hit = row
                .get(self.balance_col)
                .is_some_and(|c| c.contains(&self.balance_label));
            time_hit && balance_hit
        })
    }
}

/// A section label row immediately followed by a header row naming both the time
/// and balance columns (anywhere in the row).
#[derive(Clone, Debug)]
pub struct LabelThenHeader {
    pub section_label: String,
    pub time_label: String,
    pub balance_label: String,
}

impl RegionLocator for LabelThenHeader {
    fn name(&self) -> &'static str {
        "label-then-header"
    }

    fn locate(&self, rows: &[Vec<String>]) -> Option<usize> {
        rows.windows(2)
            .position(|pair| {
                let label_hit = pair[0].iter().any(|c| c.contains(&self.section_label));
                let header_hit = pair[1].iter().any(|c| c.contains(&self.time_label))
                    && pair[1].iter().any(|c| c.contains(&self.balance_label));
                label_hit && header_hit
            })
            .map(|i| i + 1)
    }
}

/// Locate the data region: the first locator that matches wins, then the region
/// runs to the end marker (inclusive) or the last row.
pub fn slice_data_region(
    rows: &[Vec<String>],
    locators: &[&dyn RegionLocator],
    end_marker: &str,
) -> Result<DataRegion, BuildError> {
    for locator in locators {
        let Some(header_idx) = locator.locate(rows) else {
            debug!(strategy = locator.name(), "region locator did not match");
            continue;
        };
        let start = header_idx + 1;
        let end = if end_marker.is_empty() {
            rows.len()
        } else {
            rows[start..]
                .iter()
                .position(|row| row.iter().any(|c| c.contains(end_marker)))
                .map_or(rows.len(), |offset| start + offset + 1)
        };
        debug!(strategy = locator.name(), start, end, "data region located");
        return Ok(DataRegion {
            header: rows[header_idx].clone(),
            start,
            end,
            strategy: locator.name(),
        });
    }

    Err(BuildError::NoDataRegion {
        tried: locators
            .iter()
            .map(|l| l.name())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Column-set reduction: positions to drop, plus the two positions (by original
/// index) that the series is projected from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnPlan {
    drop: BTreeSet<usize>,
    time_col: usize,
    balance_col: usize,
}

impl ColumnPlan {
    pub fn new(
        drop: impl IntoIterator<Item = usize>,
        time_col: usize,
        balance_col: usize,
    ) -> Result<Self, ConfigError> {
        let drop: BTreeSet<usize> = drop.into_iter().collect();
        if time_col == balance_col {
            return Err(ConfigError::Columns(format!(
                "time and balance both use column {time_col}"
            )));
        }
        for (name, col) in [("time", time_col), ("balance", balance_col)] {
            if drop.contains(&col) {
                return Err(ConfigError::Columns(format!(
                    "{name} column {col} is also listed for dropping"
                )));
            }
        }
        Ok(Self {
            drop,
            time_col,
            balance_col,
        })
    }

    pub fn time_col(&self) -> usize {
        self.time_col
    }

    pub fn balance_col(&self) -> usize {
        self.balance_col
    }

    /// Remove the dropped positions; positions past the row's end are ignored.
    pub fn reduce(&self, row: &[String]) -> Vec<String> {
        row.iter()
            .enumerate()
            .filter(|(i, _)| !self.drop.contains(i))
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Where an original column lands after `reduce`.
    pub fn reduced_index(&self, original: usize) -> usize {
        original - self.drop.range(..original).count()
    }

    /// (time, balance) positions within a reduced row.
    pub fn projection(&self) -> (usize, usize) {
        (
            self.reduced_index(self.time_col),
            self.reduced_index(self.balance_col),
        )
    }
}
