//! Type definitions shared by the ETL stages and the run report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LakeError;
use crate::partitioner::PartitionStats;

/// Table identifier
pub type TableName = String;

/// Fully qualified table location (`s3://bucket/prefix/table/` or `file:///...`)
pub type TableUrl = String;

/// How `songplay_id` values are assigned and how the fact table is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongplayIdMode {
    /// Clear the table and number facts from 1 on every run
    #[default]
    Replace,
    /// Keep existing facts and continue numbering after the largest stored id
    Append,
}

impl SongplayIdMode {
    /// Write mode the fact table is persisted with
    pub fn write_mode(&self) -> WriteMode {
        match self {
            SongplayIdMode::Replace => WriteMode::Overwrite,
            SongplayIdMode::Append => WriteMode::Append,
        }
    }
}

impl FromStr for SongplayIdMode {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" | "overwrite" => Ok(SongplayIdMode::Replace),
            "append" => Ok(SongplayIdMode::Append),
            other => Err(LakeError::ConfigError(format!(
                "Unknown songplay id mode '{}', expected 'replace' or 'append'",
                other
            ))),
        }
    }
}

impl fmt::Display for SongplayIdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SongplayIdMode::Replace => write!(f, "replace"),
            SongplayIdMode::Append => write!(f, "append"),
        }
    }
}

/// Which row survives when a user appears in several events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevelPolicy {
    /// Attributes (notably `level`) of the user's most recent event win
    #[default]
    Latest,
    /// No recency rule: the surviving row is implementation-defined
    Unspecified,
}

impl FromStr for UserLevelPolicy {
    type Err = LakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(UserLevelPolicy::Latest),
            "unspecified" | "arbitrary" => Ok(UserLevelPolicy::Unspecified),
            other => Err(LakeError::ConfigError(format!(
                "Unknown user level policy '{}', expected 'latest' or 'unspecified'",
                other
            ))),
        }
    }
}

impl fmt::Display for UserLevelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserLevelPolicy::Latest => write!(f, "latest"),
            UserLevelPolicy::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Whether a table write replaces or extends what is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    Overwrite,
    Append,
}

/// Outcome of writing one table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableWriteReport {
    /// Target table name
    pub table: TableName,
    /// Location the table was written to
    pub url: TableUrl,
    /// Write mode used
    pub mode: WriteMode,
    /// Rows written by this run
    pub rows_written: u64,
    /// Files and partitions present under the table prefix after the write
    pub partitions: PartitionStats,
    /// Write time in milliseconds
    pub write_time_ms: u64,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique run identifier
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Per-table write reports, in write order
    pub tables: Vec<TableWriteReport>,
}

impl PipelineReport {
    /// Look up the report of one table
    pub fn table(&self, name: &str) -> Option<&TableWriteReport> {
        self.tables.iter().find(|report| report.table == name)
    }

    /// Total rows written across all tables
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|report| report.rows_written).sum()
    }

    /// Run duration in milliseconds
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
