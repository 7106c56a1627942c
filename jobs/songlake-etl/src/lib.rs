//! Songlake ETL
//!
//! Builds the songlake star schema from raw song metadata and user event
//! logs. Stages run on a DataFusion session:
//!
//! 1. [`session`] creates the context and registers object stores.
//! 2. [`song_catalog`] writes `songs` and `artists` and returns the catalog.
//! 3. [`event_log`] writes `users`, `time` and `songplays`.
//!
//! [`pipeline::run_pipeline`] sequences them; [`writer::TableWriter`] owns
//! every parquet write.

pub mod error;
pub mod event_log;
pub mod frames;
pub mod pipeline;
pub mod session;
pub mod song_catalog;
pub mod writer;

pub use error::{EtlError, Result};
pub use pipeline::run_pipeline;
pub use session::create_session_context;
pub use song_catalog::SongCatalog;
pub use writer::TableWriter;
