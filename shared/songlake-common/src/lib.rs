//! Songlake Common Library
//!
//! Shared configuration, error type, table schemas, partition layout and
//! run-report types for the songlake ETL job. The job turns the raw song
//! catalog and user event logs into a star schema (`songplays` fact plus
//! `songs`, `artists`, `users` and `time` dimensions) stored as parquet.

pub mod config;
pub mod error;
pub mod partitioner;
pub mod schemas;
pub mod types;

// Re-export commonly used types
pub use config::{LakeConfig, StorageLocation, DEFAULT_CONFIG_FILE};
pub use error::LakeError;
pub use partitioner::{PartitionSpec, PartitionStats};
pub use schemas::{
    artists_schema,
    get_all_table_names,
    get_partition_columns_for_table,
    get_partition_fields_for_table,
    get_schema_for_table,
    // Input record schemas
    log_data_schema,
    song_data_schema,
    // Output table schemas
    songplays_schema,
    songs_schema,
    time_schema,
    users_schema,
    validate_columns,
    ARTISTS_TABLE,
    MISSING_DATE_PART,
    NEXT_SONG_PAGE,
    SONGPLAYS_TABLE,
    SONGS_TABLE,
    TIME_TABLE,
    USERS_TABLE,
};
pub use types::*;

/// Result type alias for songlake operations
pub type Result<T> = std::result::Result<T, LakeError>;
