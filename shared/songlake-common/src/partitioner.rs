//! Hive-style partition layout for songlake tables
//!
//! Partitioned tables are written as `table/col=value/.../file.parquet`.
//! This module renders and parses those paths and summarizes what a table
//! prefix holds after a write.

use object_store::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::LakeError;
use crate::schemas::get_partition_columns_for_table;

/// Partition values of one directory, outermost column first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionSpec {
    pub values: Vec<(String, String)>,
}

impl PartitionSpec {
    /// Create new partition spec from ordered column/value pairs
    pub fn new(values: Vec<(String, String)>) -> Self {
        Self { values }
    }

    /// Build a spec for `table` from values given in partition-column order
    pub fn for_table(table: &str, values: &[&str]) -> Result<Self, LakeError> {
        let columns = get_partition_columns_for_table(table);
        if columns.len() != values.len() {
            return Err(LakeError::SchemaError(format!(
                "{} is partitioned by {:?}, got {} values",
                table,
                columns,
                values.len()
            )));
        }

        Ok(Self::new(
            columns
                .iter()
                .zip(values)
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect(),
        ))
    }

    /// Whether this spec names no partition (unpartitioned table)
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of one partition column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Get partition path relative to the output root
    pub fn to_path(&self, table_name: &str) -> String {
        let mut path = table_name.to_string();
        for (column, value) in &self.values {
            path.push('/');
            path.push_str(column);
            path.push('=');
            path.push_str(value);
        }
        path
    }

    /// Parse partition values from an object key
    ///
    /// Every `col=value` segment is collected in order; the file name and
    /// plain directory segments are ignored.
    pub fn from_path(path: &str) -> Result<Self, LakeError> {
        let mut values = Vec::new();
        for part in path.split('/') {
            if let Some((column, value)) = part.split_once('=') {
                if column.is_empty() {
                    return Err(LakeError::SerializationError(format!(
                        "Invalid partition segment '{}' in {}",
                        part, path
                    )));
                }
                values.push((column.to_string(), value.to_string()));
            }
        }
        Ok(Self { values })
    }
}

/// What a table prefix holds after a write
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionStats {
    /// Number of data files
    pub files: usize,
    /// Total bytes across data files
    pub bytes: u64,
    /// Number of distinct partition directories (1 for unpartitioned tables)
    pub partitions: usize,
}

impl PartitionStats {
    /// Summarize a listing of a table prefix
    ///
    /// Only `.parquet` objects count; marker files and leftovers are skipped.
    pub fn from_objects(objects: &[ObjectMeta]) -> Result<Self, LakeError> {
        let mut stats = Self::default();
        let mut partitions = BTreeSet::new();

        for meta in objects {
            let location = meta.location.as_ref();
            if !location.ends_with(".parquet") {
                debug!("Skipping non-data object {}", location);
                continue;
            }
            stats.files += 1;
            stats.bytes += meta.size;
            partitions.insert(PartitionSpec::from_path(location)?);
        }

        stats.partitions = partitions.len();
        Ok(stats)
    }

    /// Distinct partitions found in a listing, sorted
    pub fn partition_specs(objects: &[ObjectMeta]) -> Result<Vec<PartitionSpec>, LakeError> {
        let mut specs = BTreeSet::new();
        for meta in objects {
            if meta.location.as_ref().ends_with(".parquet") {
                specs.insert(PartitionSpec::from_path(meta.location.as_ref())?.values);
            }
        }
        Ok(specs.into_iter().map(PartitionSpec::new).collect())
    }
}
