//! Integration tests for the songlake pipeline
//!
//! Each test builds a small input tree (song catalog plus one day of event
//! logs) in a temporary directory, runs the full pipeline against it and
//! reads the parquet output back.

use anyhow::Result;
use chrono::{DateTime, Datelike, Timelike};
use datafusion::arrow::array::{Array, TimestampMillisecondArray};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::display::array_value_to_string;
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::prelude::*;
use parquet::basic::Compression;
use parquet::file::reader::{FileReader, SerializedFileReader};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use songlake_common::{
    get_all_table_names, LakeConfig, SongplayIdMode, ARTISTS_TABLE, SONGPLAYS_TABLE, SONGS_TABLE,
    TIME_TABLE, USERS_TABLE,
};
use songlake_etl::{create_session_context, run_pipeline, TableWriter};
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SONG_ID: &str = "SOUPIRU12A6D4FA1E1";
const ARTIST_ID: &str = "ARJNIUY12298900C91";
const FRI_2018_11_02: i64 = 1541121934796;
const SUN_2018_11_04: i64 = 1541289600000;
const MON_2018_11_05: i64 = 1541376000000;

/// Temporary input and output roots with a config pointing at them
struct TestEnvironment {
    dir: TempDir,
    config: LakeConfig,
}

impl TestEnvironment {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input");
        let output = dir.path().join("output");

        write_json_lines(
            &input.join("song_data/A/A/A/TRAAAAV128F421A322.json"),
            &[json!({
                "num_songs": 1,
                "artist_id": ARTIST_ID,
                "artist_latitude": null,
                "artist_longitude": null,
                "artist_location": "Berlin",
                "artist_name": "JennyAnyKind",
                "song_id": SONG_ID,
                "title": "Der Kleine Dompfaff",
                "duration": 207.77751,
                "year": 2008
            })],
        )?;
        write_json_lines(
            &input.join("log_data/2018/11/2018-11-02-events.json"),
            &[
                event("Home", "10", FRI_2018_11_02 - 5000, 0, None, None),
                event(
                    "NextSong",
                    "10",
                    FRI_2018_11_02,
                    1,
                    Some("Der Kleine Dompfaff"),
                    Some(207.77751),
                ),
                event(
                    "NextSong",
                    "26",
                    SUN_2018_11_04,
                    0,
                    Some("Der Kleine Dompfaff"),
                    Some(208.5),
                ),
                event("Logout", "26", SUN_2018_11_04 + 1000, 1, None, None),
                event(
                    "NextSong",
                    "10",
                    MON_2018_11_05,
                    2,
                    Some("Another Song"),
                    Some(180.0),
                ),
            ],
        )?;

        let config = LakeConfig::default().with_paths(path_str(&input), path_str(&output))?;
        println!("📁 Test environment ready under {}", dir.path().display());
        Ok(Self { dir, config })
    }

    /// Add another JSON-lines file below the input root
    fn add_input(&self, relative: &str, lines: &[Value]) -> Result<()> {
        write_json_lines(&self.dir.path().join("input").join(relative), lines)
    }

    fn output_dir(&self, table: &str) -> PathBuf {
        self.dir.path().join("output").join(table)
    }

    /// Read a table back and return its batches sorted by `key`
    async fn read_sorted(&self, table: &str, key: &str) -> Result<Vec<RecordBatch>> {
        let ctx = create_session_context(&self.config)?;
        let writer = TableWriter::new(&ctx, &self.config);
        let frame = writer
            .read(table)
            .await?
            .ok_or_else(|| anyhow::anyhow!("table {} was not written", table))?;
        Ok(frame.sort(vec![col(key).sort(true, false)])?.collect().await?)
    }

    /// Values of one column of a table, sorted by `key`, nulls as `None`
    async fn column(&self, table: &str, key: &str, column: &str) -> Result<Vec<Option<String>>> {
        let batches = self.read_sorted(table, key).await?;
        let mut values = Vec::new();
        for batch in &batches {
            let array = batch
                .column_by_name(column)
                .ok_or_else(|| anyhow::anyhow!("{} has no column {}", table, column))?;
            for row in 0..array.len() {
                values.push(if array.is_null(row) {
                    None
                } else {
                    Some(array_value_to_string(array, row)?)
                });
            }
        }
        Ok(values)
    }

    /// Table contents rendered as text, sorted by `key`, for comparisons across runs
    async fn snapshot(&self, table: &str, key: &str) -> Result<String> {
        let batches = self.read_sorted(table, key).await?;
        Ok(pretty_format_batches(&batches)?.to_string())
    }
}

fn event(
    page: &str,
    user: &str,
    ts: i64,
    item: i64,
    song: Option<&str>,
    length: Option<f64>,
) -> Value {
    json!({
        "artist": song.map(|_| "JennyAnyKind"),
        "auth": "Logged In",
        "firstName": format!("User{}", user),
        "gender": "M",
        "itemInSession": item,
        "lastName": "Tester",
        "length": length,
        "level": "free",
        "location": "Eureka-Arcata-Fortuna, CA",
        "method": "PUT",
        "page": page,
        "registration": 1540344794796.0,
        "sessionId": 818,
        "song": song,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
        "userId": user
    })
}

fn write_json_lines(path: &Path, lines: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body: Vec<String> = lines.iter().map(Value::to_string).collect();
    std::fs::write(path, body.join("\n"))?;
    Ok(())
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_default()
}

/// Every parquet file below `dir`, relative to it
fn parquet_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "parquet") {
                files.push(path.strip_prefix(dir).unwrap_or(&path).to_path_buf());
            }
        }
    }
    files.sort();
    files
}

fn some(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|value| Some(value.to_string())).collect()
}

#[tokio::test]
async fn test_end_to_end_scenario() -> Result<()> {
    let env = TestEnvironment::new()?;
    let report = run_pipeline(&env.config).await?;

    let rows = |table: &str| report.table(table).map(|t| t.rows_written);
    assert_eq!(rows(SONGS_TABLE), Some(1));
    assert_eq!(rows(ARTISTS_TABLE), Some(1));
    assert_eq!(rows(USERS_TABLE), Some(2));
    assert_eq!(rows(TIME_TABLE), Some(3));
    assert_eq!(rows(SONGPLAYS_TABLE), Some(3));
    assert_eq!(report.tables.len(), get_all_table_names().len());

    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "songplay_id").await?,
        some(&["1", "2", "3"])
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "song_id").await?,
        vec![Some(SONG_ID.to_string()), Some(SONG_ID.to_string()), None]
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "artist_id").await?,
        vec![Some(ARTIST_ID.to_string()), Some(ARTIST_ID.to_string()), None]
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "user_id").await?,
        some(&["10", "26", "10"])
    );
    assert_eq!(
        env.column(USERS_TABLE, "user_id", "first_name").await?,
        some(&["User10", "User26"])
    );

    println!("✅ End-to-end scenario produced the expected star schema");
    Ok(())
}

#[tokio::test]
async fn test_time_table_matches_calendar() -> Result<()> {
    let env = TestEnvironment::new()?;
    run_pipeline(&env.config).await?;

    let batches = env.read_sorted(TIME_TABLE, "start_time").await?;
    let mut checked = 0;
    for batch in &batches {
        let start_times = batch
            .column_by_name("start_time")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
            .ok_or_else(|| anyhow::anyhow!("start_time is not a millisecond timestamp"))?;

        for row in 0..batch.num_rows() {
            let at = DateTime::from_timestamp_millis(start_times.value(row))
                .ok_or_else(|| anyhow::anyhow!("timestamp out of range"))?;
            let expected = [
                ("hour", at.hour().to_string()),
                ("day", at.day().to_string()),
                ("week", at.iso_week().week().to_string()),
                ("month", at.month().to_string()),
                ("year", at.year().to_string()),
                ("weekday", at.format("%a").to_string()),
            ];
            for (name, value) in expected {
                let column = batch
                    .column_by_name(name)
                    .ok_or_else(|| anyhow::anyhow!("time has no column {}", name))?;
                assert_eq!(array_value_to_string(column, row)?, value, "{} at {}", name, at);
            }
            checked += 1;
        }
    }
    assert_eq!(checked, 3);

    assert_eq!(
        env.column(TIME_TABLE, "start_time", "weekday").await?,
        some(&["Fri", "Sun", "Mon"])
    );
    assert_eq!(
        env.column(TIME_TABLE, "start_time", "week").await?,
        some(&["44", "44", "45"])
    );
    Ok(())
}

#[tokio::test]
async fn test_round_trip_preserves_column_types() -> Result<()> {
    let env = TestEnvironment::new()?;
    run_pipeline(&env.config).await?;

    assert_eq!(
        env.column(SONGS_TABLE, "song_id", "title").await?,
        some(&["Der Kleine Dompfaff"])
    );
    assert_eq!(
        env.column(SONGS_TABLE, "song_id", "duration").await?,
        some(&["207.77751"])
    );
    assert_eq!(
        env.column(SONGS_TABLE, "song_id", "year").await?,
        some(&["2008"])
    );
    assert_eq!(
        env.column(ARTISTS_TABLE, "artist_id", "latitude").await?,
        vec![None]
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "start_time").await?,
        some(&[
            "2018-11-02T01:25:34.796",
            "2018-11-04T00:00:00",
            "2018-11-05T00:00:00",
        ])
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "session_id").await?,
        some(&["818", "818", "818"])
    );
    Ok(())
}

#[tokio::test]
async fn test_partition_layout_and_compression() -> Result<()> {
    let env = TestEnvironment::new()?;
    run_pipeline(&env.config).await?;

    let songs = parquet_files(&env.output_dir(SONGS_TABLE));
    assert!(!songs.is_empty());
    assert!(songs
        .iter()
        .all(|f| f.starts_with(format!("year=2008/artist_id={}", ARTIST_ID))));

    for table in [TIME_TABLE, SONGPLAYS_TABLE] {
        let files = parquet_files(&env.output_dir(table));
        assert!(!files.is_empty(), "{} has no files", table);
        assert!(
            files.iter().all(|f| f.starts_with("year=2018/month=11")),
            "{} layout: {:?}",
            table,
            files
        );
    }

    for table in [ARTISTS_TABLE, USERS_TABLE] {
        let files = parquet_files(&env.output_dir(table));
        assert!(!files.is_empty(), "{} has no files", table);
        assert!(files.iter().all(|f| f.components().count() == 1));
    }

    for file in parquet_files(&env.output_dir(USERS_TABLE)) {
        let reader = SerializedFileReader::new(File::open(env.output_dir(USERS_TABLE).join(file))?)?;
        let metadata = reader.metadata();
        for group in metadata.row_groups() {
            for column in group.columns() {
                assert_eq!(column.compression(), Compression::SNAPPY);
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_repeated_runs_produce_identical_tables() -> Result<()> {
    let env = TestEnvironment::new()?;
    let keys = [
        (SONGS_TABLE, "song_id"),
        (ARTISTS_TABLE, "artist_id"),
        (USERS_TABLE, "user_id"),
        (TIME_TABLE, "start_time"),
        (SONGPLAYS_TABLE, "songplay_id"),
    ];

    run_pipeline(&env.config).await?;
    let mut first = Vec::new();
    for (table, key) in keys {
        first.push(env.snapshot(table, key).await?);
    }

    run_pipeline(&env.config).await?;
    for ((table, key), snapshot) in keys.into_iter().zip(first) {
        assert_eq!(env.snapshot(table, key).await?, snapshot, "{} changed", table);
    }
    Ok(())
}

#[tokio::test]
async fn test_append_mode_continues_songplay_ids() -> Result<()> {
    let mut env = TestEnvironment::new()?;
    env.config = env.config.clone().with_songplay_id_mode(SongplayIdMode::Append);

    let first = run_pipeline(&env.config).await?;
    let second = run_pipeline(&env.config).await?;
    assert_eq!(
        second.table(SONGPLAYS_TABLE).map(|t| t.rows_written),
        Some(3)
    );
    assert_ne!(first.run_id, second.run_id);

    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "songplay_id").await?,
        some(&["1", "2", "3", "4", "5", "6"])
    );
    assert_eq!(
        env.column(USERS_TABLE, "user_id", "user_id").await?,
        some(&["10", "26"])
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_config_file_is_startup_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let err = LakeConfig::from_file(dir.path().join("dl.cfg")).unwrap_err();
    assert!(err.is_startup_error());

    let incomplete = dir.path().join("incomplete.cfg");
    std::fs::write(&incomplete, "AWS_ACCESS_KEY_ID=abc\nAWS_SECRET_ACCESS_KEY=def\n")?;
    let err = LakeConfig::from_file(&incomplete).unwrap_err();
    assert!(err.is_startup_error());
    assert!(err.to_string().contains("INPUT_PATH"));
    Ok(())
}

#[tokio::test]
async fn test_missing_partition_values_round_trip() -> Result<()> {
    let env = TestEnvironment::new()?;
    env.add_input(
        "song_data/A/A/B/TRAABXX128F421A999.json",
        &[
            json!({"song_id": "SONOARTIST000000001", "title": "Orphan", "duration": 120.0, "year": 2000}),
            json!({"song_id": "SONOYEAR0000000001", "artist_id": ARTIST_ID, "artist_name": "JennyAnyKind", "title": "Undated", "duration": 90.0}),
        ],
    )?;
    let mut untimed = event("NextSong", "26", 0, 5, Some("Undated"), Some(90.0));
    untimed["ts"] = Value::Null;
    env.add_input("log_data/2018/11/2018-11-03-events.json", &[untimed])?;

    let report = run_pipeline(&env.config).await?;
    assert_eq!(report.table(SONGPLAYS_TABLE).map(|t| t.rows_written), Some(4));
    assert_eq!(report.table(TIME_TABLE).map(|t| t.rows_written), Some(3));

    assert_eq!(
        env.column(SONGS_TABLE, "song_id", "song_id").await?,
        some(&["SONOYEAR0000000001", SONG_ID])
    );
    assert_eq!(
        env.column(SONGS_TABLE, "song_id", "year").await?,
        some(&["0", "2008"])
    );
    assert!(parquet_files(&env.output_dir(SONGS_TABLE))
        .iter()
        .all(|f| !f.to_string_lossy().contains("artist_id=/")));

    assert!(parquet_files(&env.output_dir(SONGPLAYS_TABLE))
        .iter()
        .any(|f| f.starts_with("year=0/month=0")));
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "start_time").await?[3],
        None
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "year").await?,
        vec![Some("2018".to_string()), Some("2018".to_string()), Some("2018".to_string()), None]
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "month").await?,
        vec![Some("11".to_string()), Some("11".to_string()), Some("11".to_string()), None]
    );
    assert_eq!(
        env.column(SONGPLAYS_TABLE, "songplay_id", "song_id").await?[3],
        Some("SONOYEAR0000000001".to_string())
    );
    Ok(())
}
