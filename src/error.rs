use chrono::NaiveDateTime;
use thiserror::Error;

/// A single literal could not be read. Row-scoped: callers recover by dropping
/// the row (timestamps) or marking the value missing (numbers).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// No supported layout matched the timestamp text.
    #[error("unparsable timestamp `{literal}`")]
    Timestamp {
        /// The offending cell text, untrimmed.
        literal: String,
    },

    /// The balance cell is not a decimal number after cleaning.
    #[error("unparsable number `{literal}`")]
    Number {
        /// The offending cell text, untrimmed.
        literal: String,
    },
}

/// Structural problems found while turning a raw table into a series.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// None of the region locators found the header row.
    #[error("no data region found (tried: {tried})")]
    NoDataRegion {
        /// Comma separated names of the strategies that were attempted.
        tried: String,
    },

    /// Every candidate row was filtered or failed to parse.
    #[error("series is empty after filtering ({dropped} rows dropped)")]
    EmptySeries {
        /// Rows dropped because their timestamp could not be parsed.
        dropped: usize,
    },

    /// Records handed to `Series::new` were not strictly increasing.
    #[error("series is not strictly increasing at {at}")]
    NotIncreasing {
        /// First timestamp that is not later than its predecessor.
        at: NaiveDateTime,
    },
}

/// Failures of the grid regularizer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegularizeError {
    /// There is no min/max to span.
    #[error("cannot regularize an empty series")]
    EmptySeries,

    /// Cadence must be a positive divisor of 60 minutes.
    #[error("invalid cadence of {minutes} minutes (must divide 60)")]
    InvalidCadence {
        /// Configured cadence.
        minutes: u32,
    },

    /// The first grid point has no observed value to carry forward.
    #[error("first grid point {timestamp} has no observed value")]
    NoLeadingValue {
        /// The first grid point.
        timestamp: NaiveDateTime,
    },
}

/// The two merge sources do not describe the same logical dataset.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompatibilityError {
    /// The identity pattern did not match the file name.
    #[error("no identity tokens in `{name}`")]
    MissingTokens {
        /// File name that failed to match.
        name: String,
    },

    /// Both names matched but their token pairs differ.
    #[error("identity mismatch: {primary} vs {secondary}")]
    Mismatch {
        /// Tokens of the primary source, e.g. `CT3_Pd2`.
        primary: String,
        /// Tokens of the secondary source.
        secondary: String,
    },

    /// The configured pattern is not a valid regex or lacks two capture groups.
    #[error("invalid identity pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// Pattern text from configuration.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failures of the two-source merge.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error(transparent)]
    Incompatible(#[from] CompatibilityError),

    /// The named key column is not among the table headers.
    #[error("{side} table has no `{column}` column (available: {available})")]
    MissingKeyColumn {
        /// `primary` or `secondary`.
        side: &'static str,
        /// Requested key column name.
        column: String,
        /// Comma separated header names.
        available: String,
    },

    /// The join produced no rows at all.
    #[error("merge produced zero rows")]
    EmptyResult,
}

/// Invalid engine configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Cadence(#[from] RegularizeError),

    /// A retained column is also listed for dropping, or time == balance.
    #[error("invalid column plan: {0}")]
    Columns(String),

    #[error(transparent)]
    Identity(#[from] CompatibilityError),
}

/// Umbrella error for the end-to-end pipelines.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Regularize(#[from] RegularizeError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}
