//! Arrow schemas for the songlake inputs and star-schema tables
//!
//! Input schemas are deliberately all-nullable: records missing a field are
//! read as nulls instead of being rejected. Output schemas list columns in the
//! order the transforms produce them, partition columns included.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

use crate::error::LakeError;

/// Songs dimension table
pub const SONGS_TABLE: &str = "songs";
/// Artists dimension table
pub const ARTISTS_TABLE: &str = "artists";
/// Users dimension table
pub const USERS_TABLE: &str = "users";
/// Time dimension table
pub const TIME_TABLE: &str = "time";
/// Songplays fact table
pub const SONGPLAYS_TABLE: &str = "songplays";

/// Event-log `page` value that marks a song play
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// Stand-in for a missing date part in a partition column
///
/// Songs with no `year` are stored under `year=0`, the catalog's own marker
/// for an unknown year. Plays with no timestamp are stored under
/// `year=0/month=0`; month 0 never occurs in a real date, so readers of
/// `songplays` turn it back into null.
pub const MISSING_DATE_PART: i32 = 0;

/// Timestamp type used for `start_time` (epoch milliseconds, no zone)
pub fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}

/// Schema of one song-catalog JSON record
pub fn song_data_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("num_songs", DataType::Int64, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("year", DataType::Int32, true),
    ]))
}

/// Schema of one event-log JSON record
///
/// `userId` arrives as a string (empty for logged-out events) and is cast
/// to an integer by the users/songplays transforms.
pub fn log_data_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("auth", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("itemInSession", DataType::Int64, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("method", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, true),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        Field::new("ts", DataType::Int64, true),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ]))
}

/// Songs dimension: one row per `song_id`
///
/// Partitioning: year → artist_id
pub fn songs_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("year", DataType::Int32, true),
        Field::new("duration", DataType::Float64, true),
    ]))
}

/// Artists dimension: one row per `artist_id`
pub fn artists_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ]))
}

/// Users dimension: one row per `user_id`
pub fn users_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ]))
}

/// Time dimension: one row per distinct `start_time`
///
/// `week` is the ISO-8601 week number, `weekday` the abbreviated day name.
/// Partitioning: year → month
pub fn time_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("start_time", start_time_type(), false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Utf8, false),
    ]))
}

/// Songplays fact: one row per NextSong event
///
/// `song_id`/`artist_id` are null when no catalog entry matched.
/// Partitioning: year → month
pub fn songplays_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_time", start_time_type(), false),
        Field::new("user_id", DataType::Int64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
    ]))
}

/// Get the schema for an output table by name
pub fn get_schema_for_table(table: &str) -> Option<Arc<Schema>> {
    match table {
        SONGS_TABLE => Some(songs_schema()),
        ARTISTS_TABLE => Some(artists_schema()),
        USERS_TABLE => Some(users_schema()),
        TIME_TABLE => Some(time_schema()),
        SONGPLAYS_TABLE => Some(songplays_schema()),
        _ => None,
    }
}

/// Get the partition columns for an output table, outermost first
pub fn get_partition_columns_for_table(table: &str) -> &'static [&'static str] {
    match table {
        SONGS_TABLE => &["year", "artist_id"],
        TIME_TABLE | SONGPLAYS_TABLE => &["year", "month"],
        _ => &[],
    }
}

/// Partition columns of a table paired with their declared types
pub fn get_partition_fields_for_table(table: &str) -> Result<Vec<(String, DataType)>, LakeError> {
    let schema = get_schema_for_table(table)
        .ok_or_else(|| LakeError::SchemaError(format!("Unknown table: {}", table)))?;

    get_partition_columns_for_table(table)
        .iter()
        .map(|column| {
            schema
                .field_with_name(column)
                .map(|field| (column.to_string(), field.data_type().clone()))
                .map_err(LakeError::from)
        })
        .collect()
}

/// All output tables in write order
pub fn get_all_table_names() -> Vec<&'static str> {
    vec![
        SONGS_TABLE,
        ARTISTS_TABLE,
        USERS_TABLE,
        TIME_TABLE,
        SONGPLAYS_TABLE,
    ]
}

/// Compare produced columns against a table's declared schema
///
/// Only names and data types are compared, in order; nullability is decided
/// by the engine and may be looser than declared.
pub fn validate_columns<'a>(
    table: &str,
    produced: impl IntoIterator<Item = (&'a str, &'a DataType)>,
) -> Result<(), LakeError> {
    let expected = get_schema_for_table(table)
        .ok_or_else(|| LakeError::SchemaError(format!("Unknown table: {}", table)))?;

    let produced: Vec<(&str, &DataType)> = produced.into_iter().collect();
    if produced.len() != expected.fields().len() {
        return Err(LakeError::SchemaError(format!(
            "{}: expected {} columns, got {} ({})",
            table,
            expected.fields().len(),
            produced.len(),
            produced
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    for (field, (name, data_type)) in expected.fields().iter().zip(produced) {
        if field.name() != name {
            return Err(LakeError::SchemaError(format!(
                "{}: expected column '{}', got '{}'",
                table,
                field.name(),
                name
            )));
        }
        if field.data_type() != data_type {
            return Err(LakeError::SchemaError(format!(
                "{}.{}: expected type {}, got {}",
                table,
                name,
                field.data_type(),
                data_type
            )));
        }
    }

    Ok(())
}
