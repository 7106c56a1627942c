//! Orchestration
//!
//! Runs the song-catalog stage, then the event-log stage, on one session.
//! The event-log stage consumes the catalog frames directly. Any error aborts
//! the run; tables written before the failure are left as they are.

use chrono::Utc;
use songlake_common::{LakeConfig, PipelineReport};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::event_log::process_log_data;
use crate::session::create_session_context;
use crate::song_catalog::process_song_data;
use crate::writer::TableWriter;

/// Run the whole pipeline once
pub async fn run_pipeline(config: &LakeConfig) -> Result<PipelineReport> {
    run_with_id(config, Uuid::new_v4().to_string()).await
}

#[instrument(name = "pipeline", skip(config))]
async fn run_with_id(config: &LakeConfig, run_id: String) -> Result<PipelineReport> {
    let started_at = Utc::now();
    info!(
        "[PIPELINE] Run started: input={} output={}",
        config.input_root(),
        config.output_root()
    );

    let ctx = create_session_context(config)?;
    let writer = TableWriter::new(&ctx, config);

    let (catalog, mut tables) = process_song_data(&ctx, config, &writer).await?;
    tables.extend(process_log_data(&ctx, config, &catalog, &writer).await?);

    let report = PipelineReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        tables,
    };
    info!(
        "[PIPELINE] ✓ Run finished: {} tables, {} rows in {}ms",
        report.tables.len(),
        report.total_rows(),
        report.duration_ms()
    );
    Ok(report)
}
