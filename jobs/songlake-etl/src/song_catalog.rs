//! Song-catalog transform
//!
//! Reads the song metadata JSON tree and derives the `songs` and `artists`
//! dimensions. The deduplicated song rows also back the lookup frame the
//! event-log stage matches plays against, handed over in a [`SongCatalog`].
//!
//! Songs without an `artist_id` are left out of both `songs` and the lookup,
//! so plays never reference a song that was not written. A missing `year` is
//! stored as [`MISSING_DATE_PART`].

use datafusion::prelude::*;
use songlake_common::{
    song_data_schema, LakeConfig, TableWriteReport, WriteMode, ARTISTS_TABLE, MISSING_DATE_PART,
    SONGS_TABLE,
};
use tracing::{info, instrument};

use crate::error::Result;
use crate::frames::first_per_key;
use crate::writer::TableWriter;

/// Frames derived from the song catalog
#[derive(Clone)]
pub struct SongCatalog {
    /// `songs` dimension, one row per song_id
    pub songs: DataFrame,
    /// `artists` dimension, one row per artist_id
    pub artists: DataFrame,
    /// Match candidates for plays: `catalog_song_id`, `catalog_title`,
    /// `catalog_artist_id`, `catalog_artist_name`, `catalog_duration`
    pub lookup: DataFrame,
}

impl SongCatalog {
    /// Derive every catalog frame from raw song records
    pub fn from_song_data(song_data: DataFrame) -> Result<Self> {
        let songs_rows = first_per_key(
            song_data.clone(),
            "song_id",
            &[
                ("song_id", "song_id"),
                ("title", "title"),
                ("artist_id", "artist_id"),
                ("artist_name", "artist_name"),
                ("year", "year"),
                ("duration", "duration"),
            ],
            vec![],
        )?
        // songs are partitioned by artist_id, so a song without one has no home
        .filter(col("artist_id").is_not_null())?;

        Ok(Self {
            songs: songs_table(songs_rows.clone())?,
            artists: artists_table(song_data)?,
            lookup: catalog_lookup(songs_rows)?,
        })
    }
}

/// Read every `*.json` file below the song-data prefix
pub async fn read_song_data(ctx: &SessionContext, config: &LakeConfig) -> Result<DataFrame> {
    let url = config.song_data_url();
    let schema = song_data_schema();
    info!("[SONGS] Reading song catalog from {}", url);

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

fn songs_table(songs_rows: DataFrame) -> Result<DataFrame> {
    let songs = songs_rows.select(vec![
        col("song_id"),
        col("title"),
        col("artist_id"),
        coalesce(vec![col("year"), lit(MISSING_DATE_PART)]).alias("year"),
        col("duration"),
    ])?;
    Ok(songs)
}

/// Project artist attributes, one row per artist_id
pub fn artists_table(song_data: DataFrame) -> Result<DataFrame> {
    first_per_key(
        song_data,
        "artist_id",
        &[
            ("artist_id", "artist_id"),
            ("artist_name", "name"),
            ("artist_location", "location"),
            ("artist_latitude", "latitude"),
            ("artist_longitude", "longitude"),
        ],
        vec![],
    )
}

fn catalog_lookup(songs_rows: DataFrame) -> Result<DataFrame> {
    let lookup = songs_rows.select(vec![
        col("song_id").alias("catalog_song_id"),
        col("title").alias("catalog_title"),
        col("artist_id").alias("catalog_artist_id"),
        col("artist_name").alias("catalog_artist_name"),
        col("duration").alias("catalog_duration"),
    ])?;
    Ok(lookup)
}

/// Read the catalog, write `songs` and `artists`, and hand the frames on
#[instrument(skip_all, fields(input = %config.song_data_url()))]
pub async fn process_song_data(
    ctx: &SessionContext,
    config: &LakeConfig,
    writer: &TableWriter,
) -> Result<(SongCatalog, Vec<TableWriteReport>)> {
    info!("[SONGS] Starting song-catalog stage");

    // Both dimensions and the lookup scan the same records
    let song_data = read_song_data(ctx, config).await?.cache().await?;
    let catalog = SongCatalog::from_song_data(song_data)?;

    let reports = vec![
        writer
            .write(SONGS_TABLE, catalog.songs.clone(), WriteMode::Overwrite)
            .await?,
        writer
            .write(ARTISTS_TABLE, catalog.artists.clone(), WriteMode::Overwrite)
            .await?,
    ];

    info!("[SONGS] ✓ Song-catalog stage complete");
    Ok((catalog, reports))
}
