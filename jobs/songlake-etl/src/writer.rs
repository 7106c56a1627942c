//! Table writer
//!
//! Persists derived frames as parquet under `<output root>/<table>/`, with
//! hive-style partition directories for partitioned tables. Overwrite mode
//! clears the table prefix first; no two-phase commit exists, so a failed run
//! can leave some tables rewritten and others untouched.

use datafusion::arrow::array::{Array, Int64Array, UInt64Array};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::config::TableParquetOptions;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::datasource::listing::ListingTableUrl;
use datafusion::functions_aggregate::expr_fn::max;
use datafusion::prelude::*;
use datafusion::scalar::ScalarValue;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use songlake_common::{
    get_partition_columns_for_table, get_partition_fields_for_table, LakeConfig, PartitionStats,
    TableWriteReport, WriteMode, MISSING_DATE_PART, SONGPLAYS_TABLE,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::frames::check_table_schema;

/// Writes and reads back the output tables of one session
#[derive(Clone)]
pub struct TableWriter {
    ctx: SessionContext,
    config: LakeConfig,
}

impl TableWriter {
    pub fn new(ctx: &SessionContext, config: &LakeConfig) -> Self {
        Self {
            ctx: ctx.clone(),
            config: config.clone(),
        }
    }

    /// Directory URL of an output table
    pub fn table_url(&self, table: &str) -> String {
        self.config.table_url(table)
    }

    fn store_for(&self, table: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
        let url = ListingTableUrl::parse(self.table_url(table))?;
        let store = self.ctx.runtime_env().object_store(url.object_store())?;
        Ok((store, url.prefix().clone()))
    }

    /// Every object currently stored under a table prefix
    pub async fn list_table_objects(&self, table: &str) -> Result<Vec<ObjectMeta>> {
        let (store, prefix) = self.store_for(table)?;
        match store.list(Some(&prefix)).try_collect::<Vec<_>>().await {
            Ok(objects) => Ok(objects),
            Err(object_store::Error::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete everything under a table prefix, returning the number of objects removed
    pub async fn clear_table(&self, table: &str) -> Result<usize> {
        let (store, _) = self.store_for(table)?;
        let objects = self.list_table_objects(table).await?;
        for meta in &objects {
            debug!("Deleting {}", meta.location);
            store.delete(&meta.location).await?;
        }
        Ok(objects.len())
    }

    fn parquet_options(&self) -> TableParquetOptions {
        let mut options = TableParquetOptions::default();
        options.global.compression = Some(self.config.parquet_compression.clone());
        options
    }

    /// Write one table
    #[instrument(skip(self, frame), fields(url = %self.table_url(table)))]
    pub async fn write(
        &self,
        table: &str,
        frame: DataFrame,
        mode: WriteMode,
    ) -> Result<TableWriteReport> {
        let start = Instant::now();
        check_table_schema(table, &frame)?;

        if mode == WriteMode::Overwrite {
            let removed = self.clear_table(table).await?;
            if removed > 0 {
                info!("[WRITE] Cleared {} existing objects from {}", removed, table);
            }
        }

        let partition_by: Vec<String> = get_partition_columns_for_table(table)
            .iter()
            .map(|column| column.to_string())
            .collect();
        let url = self.table_url(table);

        info!(
            "[WRITE] Writing {} to {} (partition_by={:?}, compression={})",
            table, url, partition_by, self.config.parquet_compression
        );
        let result = frame
            .write_parquet(
                &url,
                DataFrameWriteOptions::new().with_partition_by(partition_by),
                Some(self.parquet_options()),
            )
            .await?;
        let rows_written = rows_from_write_result(&result);

        let objects = self.list_table_objects(table).await?;
        let partitions = PartitionStats::from_objects(&objects)?;
        for spec in PartitionStats::partition_specs(&objects)? {
            debug!("[WRITE] {} partition {}", table, spec.to_path(table));
        }
        if rows_written > 0 && partitions.files == 0 {
            warn!("[WRITE] {} reported {} rows but no files were listed", table, rows_written);
        }

        let report = TableWriteReport {
            table: table.to_string(),
            url,
            mode,
            rows_written,
            partitions,
            write_time_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "[WRITE] ✓ {}: {} rows, {} files, {} partitions, {} bytes in {}ms",
            table,
            report.rows_written,
            report.partitions.files,
            report.partitions.partitions,
            report.partitions.bytes,
            report.write_time_ms
        );
        Ok(report)
    }

    /// Read a written table back, restoring its partition columns
    ///
    /// Returns `None` when the table holds no data files. Untimed plays in
    /// `songplays` come back with null `year` and `month`.
    pub async fn read(&self, table: &str) -> Result<Option<DataFrame>> {
        let objects = self.list_table_objects(table).await?;
        if !objects
            .iter()
            .any(|meta| meta.location.as_ref().ends_with(".parquet"))
        {
            return Ok(None);
        }

        let options =
            ParquetReadOptions::default().table_partition_cols(get_partition_fields_for_table(table)?);
        let frame = self.ctx.read_parquet(self.table_url(table), options).await?;
        if table == SONGPLAYS_TABLE {
            return Ok(Some(restore_missing_dates(frame)?));
        }
        Ok(Some(frame))
    }

    /// Largest stored `songplay_id`, 0 when the fact table is empty or absent
    pub async fn max_songplay_id(&self) -> Result<i64> {
        let Some(frame) = self.read(SONGPLAYS_TABLE).await? else {
            return Ok(0);
        };

        let batches = frame
            .aggregate(vec![], vec![max(col("songplay_id")).alias("max_id")])?
            .collect()
            .await?;

        let max_id = batches
            .iter()
            .filter_map(|batch| batch.column_by_name("max_id"))
            .filter_map(|column| column.as_any().downcast_ref::<Int64Array>())
            .flat_map(|array| array.iter().flatten())
            .max()
            .unwrap_or(0);
        Ok(max_id)
    }
}

/// Turn the `year=0/month=0` partition of untimed plays back into nulls
fn restore_missing_dates(frame: DataFrame) -> Result<DataFrame> {
    let missing = col("month").eq(lit(MISSING_DATE_PART));
    let null = lit(ScalarValue::Int32(None));

    let frame = frame
        .with_column(
            "year",
            when(missing.clone(), null.clone()).otherwise(col("year"))?,
        )?
        .with_column("month", when(missing, null).otherwise(col("month"))?)?;
    Ok(frame)
}

/// Sum the `count` column the engine returns from a write
fn rows_from_write_result(batches: &[RecordBatch]) -> u64 {
    batches
        .iter()
        .filter_map(|batch| batch.column_by_name("count"))
        .filter_map(|column| column.as_any().downcast_ref::<UInt64Array>())
        .flat_map(|array| array.iter().flatten())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::StringArray;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use songlake_common::{artists_schema, ARTISTS_TABLE, USERS_TABLE};

    #[test]
    fn test_rows_from_write_result_sums_counts() {
        let schema = Arc::new(Schema::new(vec![Field::new("count", DataType::UInt64, false)]));
        let first =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(UInt64Array::from(vec![3]))])
                .unwrap();
        let second =
            RecordBatch::try_new(schema, vec![Arc::new(UInt64Array::from(vec![4]))]).unwrap();

        assert_eq!(rows_from_write_result(&[first, second]), 7);
        assert_eq!(rows_from_write_result(&[]), 0);
    }

    fn local_writer(output: &std::path::Path) -> TableWriter {
        let config = LakeConfig::default()
            .with_paths("data", output.to_str().unwrap())
            .unwrap();
        TableWriter::new(&SessionContext::new(), &config)
    }

    #[tokio::test]
    async fn test_missing_table_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let writer = local_writer(dir.path());

        assert!(writer.list_table_objects(USERS_TABLE).await.unwrap().is_empty());
        assert!(writer.read(USERS_TABLE).await.unwrap().is_none());
        assert_eq!(writer.max_songplay_id().await.unwrap(), 0);
        assert_eq!(writer.clear_table(USERS_TABLE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_rejects_schema_drift() {
        let dir = tempfile::tempdir().unwrap();
        let writer = local_writer(dir.path());

        let schema = Arc::new(Schema::new(vec![Field::new("artist_id", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(StringArray::from(vec!["AR1"]))],
        )
        .unwrap();
        let frame = SessionContext::new().read_batch(batch).unwrap();

        let err = writer
            .write(ARTISTS_TABLE, frame, WriteMode::Overwrite)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Schema mismatch"));
        assert!(writer.list_table_objects(ARTISTS_TABLE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_and_append_extends() {
        let dir = tempfile::tempdir().unwrap();
        let writer = local_writer(dir.path());
        let ctx = SessionContext::new();

        let batch = RecordBatch::try_new(
            artists_schema(),
            vec![
                Arc::new(StringArray::from(vec!["AR1", "AR2"])),
                Arc::new(StringArray::from(vec![Some("Casual"), Some("Jinx")])),
                Arc::new(StringArray::from(vec![None, Some("Hamilton, Ohio")])),
                Arc::new(datafusion::arrow::array::Float64Array::from(vec![
                    None,
                    Some(39.39),
                ])),
                Arc::new(datafusion::arrow::array::Float64Array::from(vec![
                    None,
                    Some(-84.56),
                ])),
            ],
        )
        .unwrap();

        let first = writer
            .write(ARTISTS_TABLE, ctx.read_batch(batch.clone()).unwrap(), WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(first.rows_written, 2);
        assert_eq!(first.partitions.partitions, 1);

        writer
            .write(ARTISTS_TABLE, ctx.read_batch(batch.clone()).unwrap(), WriteMode::Overwrite)
            .await
            .unwrap();
        let stored = writer.read(ARTISTS_TABLE).await.unwrap().unwrap();
        assert_eq!(stored.count().await.unwrap(), 2);

        writer
            .write(ARTISTS_TABLE, ctx.read_batch(batch).unwrap(), WriteMode::Append)
            .await
            .unwrap();
        let stored = writer.read(ARTISTS_TABLE).await.unwrap().unwrap();
        assert_eq!(stored.count().await.unwrap(), 4);
    }
}
