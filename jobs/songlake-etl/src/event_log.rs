//! Event-log transform
//!
//! Filters the activity logs down to song plays and derives the `users` and
//! `time` dimensions plus the `songplays` fact table. Plays are matched to
//! the catalog by title, artist name and duration; unmatched plays keep null
//! song and artist references.

use datafusion::arrow::datatypes::DataType;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::ExprFunctionExt;
use datafusion::prelude::*;
use songlake_common::{
    log_data_schema, LakeConfig, SongplayIdMode, TableWriteReport, UserLevelPolicy, WriteMode,
    MISSING_DATE_PART, NEXT_SONG_PAGE, SONGPLAYS_TABLE, TIME_TABLE, USERS_TABLE,
};
use tracing::{info, instrument};

use crate::error::Result;
use crate::frames::first_per_key;
use crate::song_catalog::SongCatalog;
use crate::writer::TableWriter;

/// Read every `*.json` file below the log-data prefix
pub async fn read_log_data(ctx: &SessionContext, config: &LakeConfig) -> Result<DataFrame> {
    let url = config.log_data_url();
    let schema = log_data_schema();
    info!("[EVENTS] Reading event logs from {}", url);

    let frame = ctx
        .read_json(
            url,
            NdJsonReadOptions::default()
                .schema(schema.as_ref())
                .file_extension(".json"),
        )
        .await?;
    Ok(frame)
}

/// Keep `NextSong` events and add `start_time` and an integer `user_id`
///
/// A `userId` that is empty or not a number becomes a null `user_id`.
pub fn song_play_events(log_data: DataFrame) -> Result<DataFrame> {
    let events = log_data
        .filter(col("page").eq(lit(NEXT_SONG_PAGE)))?
        .with_column("start_time", to_timestamp_millis(vec![col("ts")]))?
        .with_column("user_id", try_cast(ident("userId"), DataType::Int64))?;
    Ok(events)
}

/// One row per user, picked according to `policy`
pub fn users_table(events: DataFrame, policy: UserLevelPolicy) -> Result<DataFrame> {
    let order = match policy {
        UserLevelPolicy::Latest => vec![
            col("ts").sort(false, false),
            ident("itemInSession").sort(false, false),
        ],
        UserLevelPolicy::Unspecified => vec![],
    };

    first_per_key(
        events,
        "user_id",
        &[
            ("user_id", "user_id"),
            ("firstName", "first_name"),
            ("lastName", "last_name"),
            ("gender", "gender"),
            ("level", "level"),
        ],
        order,
    )
}

fn date_field(part: &str) -> Expr {
    cast(date_part(lit(part), col("start_time")), DataType::Int32)
}

/// Calendar breakdown of every distinct `start_time`
pub fn time_table(events: DataFrame) -> Result<DataFrame> {
    let time = events
        .select(vec![col("start_time")])?
        .filter(col("start_time").is_not_null())?
        .distinct()?
        .select(vec![
            col("start_time"),
            date_field("hour").alias("hour"),
            date_field("day").alias("day"),
            date_field("week").alias("week"),
            date_field("month").alias("month"),
            date_field("year").alias("year"),
            to_char(col("start_time"), lit("%a")).alias("weekday"),
        ])?;
    Ok(time)
}

/// One fact row per play, with ids starting at `id_offset + 1`
///
/// Plays are numbered in `(ts, sessionId, itemInSession, userId)` order. When
/// several catalog songs match a play, the closest duration wins and ties go
/// to the smallest song id. A play without a timestamp is kept with
/// [`MISSING_DATE_PART`] as its year and month.
pub fn songplays_table(
    events: DataFrame,
    lookup: DataFrame,
    tolerance_secs: f64,
    id_offset: i64,
) -> Result<DataFrame> {
    let numbered = events.with_column(
        "event_seq",
        row_number()
            .order_by(vec![
                col("ts").sort(true, false),
                ident("sessionId").sort(true, false),
                ident("itemInSession").sort(true, false),
                ident("userId").sort(true, false),
            ])
            .build()?,
    )?;

    let duration_delta = || abs(col("length") - col("catalog_duration"));

    let matched = numbered.join_on(
        lookup,
        JoinType::Left,
        vec![
            col("song").eq(col("catalog_title")),
            col("artist").eq(col("catalog_artist_name")),
            duration_delta().lt(lit(tolerance_secs)),
        ],
    )?;

    let songplays = matched.distinct_on(
        vec![col("event_seq")],
        vec![
            (cast(col("event_seq"), DataType::Int64) + lit(id_offset)).alias("songplay_id"),
            col("start_time"),
            col("user_id"),
            col("level"),
            col("catalog_song_id").alias("song_id"),
            col("catalog_artist_id").alias("artist_id"),
            ident("sessionId").alias("session_id"),
            col("location"),
            ident("userAgent").alias("user_agent"),
            coalesce(vec![date_field("year"), lit(MISSING_DATE_PART)]).alias("year"),
            coalesce(vec![date_field("month"), lit(MISSING_DATE_PART)]).alias("month"),
        ],
        Some(vec![
            col("event_seq").sort(true, false),
            duration_delta().sort(true, false),
            col("catalog_song_id").sort(true, false),
        ]),
    )?;
    Ok(songplays)
}

/// Read the logs and write `users`, `time` and `songplays`
#[instrument(skip_all, fields(input = %config.log_data_url()))]
pub async fn process_log_data(
    ctx: &SessionContext,
    config: &LakeConfig,
    catalog: &SongCatalog,
    writer: &TableWriter,
) -> Result<Vec<TableWriteReport>> {
    info!("[EVENTS] Starting event-log stage");

    let events = song_play_events(read_log_data(ctx, config).await?)?
        .cache()
        .await?;

    let mut reports = Vec::with_capacity(3);
    reports.push(
        writer
            .write(
                USERS_TABLE,
                users_table(events.clone(), config.user_level_policy)?,
                WriteMode::Overwrite,
            )
            .await?,
    );
    reports.push(
        writer
            .write(TIME_TABLE, time_table(events.clone())?, WriteMode::Overwrite)
            .await?,
    );

    let id_offset = match config.songplay_id_mode {
        SongplayIdMode::Replace => 0,
        SongplayIdMode::Append => writer.max_songplay_id().await?,
    };
    info!(
        "[EVENTS] songplay_id mode={} starting after {}",
        config.songplay_id_mode, id_offset
    );

    let songplays = songplays_table(
        events,
        catalog.lookup.clone(),
        config.duration_tolerance_secs,
        id_offset,
    )?;
    reports.push(
        writer
            .write(
                SONGPLAYS_TABLE,
                songplays,
                config.songplay_id_mode.write_mode(),
            )
            .await?,
    );

    info!(
        "[EVENTS] ✓ Event-log stage complete: {} plays",
        reports.last().map(|report| report.rows_written).unwrap_or_default()
    );
    Ok(reports)
}
