// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::ConfigError;
use crate::process::classify::{ColumnPlan, LabelThenHeader, SameRowLabels};
use crate::process::date_parser::Cadence;
use crate::process::merge::{IdentityPattern, DEFAULT_IDENTITY_PATTERN};

/// Everything the engine needs from its caller. Every field has a default, so a
/// config file only lists what it overrides.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Grid step in minutes; must divide 60.
    pub cadence_minutes: u32,
    /// Literal that closes the data region.
    pub end_marker: String,
    /// Case-insensitive token flagging summary/footer rows; `null` disables it.
    pub summary_marker: Option<String>,
    pub columns: ColumnsConfig,
    pub region: RegionConfig,
    pub merge: MergeConfig,
}

/// Column positions, all by original index.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnsConfig {
    pub time: usize,
    pub balance: usize,
    pub drop: Vec<usize>,
}

/// Labels used to find the header row that opens the data region.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RegionConfig {
    pub time_label: String,
    pub balance_label: String,
    pub section_label: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    /// Regex with two capture groups (category, subcode).
    pub identity_pattern: String,
    pub primary_key: String,
    pub secondary_key: String,
    /// Prefix of generated merged file names.
    pub output_prefix: String,
    /// Secondary name token (by prefix) appended to merged file names.
    pub carry_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cadence_minutes: 15,
            end_marker: "end of test".into(),
            summary_marker: Some("balance".into()),
            columns: ColumnsConfig::default(),
            region: RegionConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        // 13-column deal export: keep 時間 (0) and 残高 (11)
        Self {
            time: 0,
            balance: 11,
            drop: (1..=10).chain([12]).collect(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            time_label: "時間".into(),
            balance_label: "残高".into(),
            section_label: "約定".into(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            identity_pattern: DEFAULT_IDENTITY_PATTERN.into(),
            primary_key: "時間".into(),
            secondary_key: "Time".into(),
            output_prefix: "H4".into(),
            carry_prefix: "FI".into(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text).context("parsing engine config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
        Self::from_yaml_str(&text).with_context(|| format!("in config {:?}", path))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cadence()?;
        self.column_plan()?;
        self.identity_pattern()?;
        Ok(())
    }

    pub fn cadence(&self) -> Result<Cadence, ConfigError> {
        Ok(Cadence::from_minutes(self.cadence_minutes)?)
    }

    pub fn column_plan(&self) -> Result<ColumnPlan, ConfigError> {
        ColumnPlan::new(
            self.columns.drop.iter().copied(),
            self.columns.time,
            self.columns.balance,
        )
    }

    pub fn identity_pattern(&self) -> Result<IdentityPattern, ConfigError> {
        Ok(IdentityPattern::new(&self.merge.identity_pattern)?)
    }

    /// Region locators in the order they are tried.
    pub fn locators(&self) -> (SameRowLabels, LabelThenHeader) {
        (
            SameRowLabels {
                time_col: self.columns.time,
                balance_col: self.columns.balance,
                time_label: self.region.time_label.clone(),
                balance_label: self.region.balance_label.clone(),
            },
            LabelThenHeader {
                section_label: self.region.section_label.clone(),
                time_label: self.region.time_label.clone(),
                balance_label: self.region.balance_label.clone(),
            },
        )
    }
}
