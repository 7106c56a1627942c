//! Session acquisition
//!
//! Creates the dataframe engine context the stages run on and registers an
//! S3 object store for every bucket the configuration points at. Local roots
//! need nothing: the engine ships with a filesystem store.
//!
//! Building a store does not contact S3, so bad credentials only surface on
//! the first read or write.

use datafusion::prelude::{SessionConfig, SessionContext};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use songlake_common::{LakeConfig, LakeError, StorageLocation};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::error::Result;

/// Create a session context configured for `config`
pub fn create_session_context(config: &LakeConfig) -> Result<SessionContext> {
    info!(">>> SESSION: Creating dataframe session...");

    let mut session_config = SessionConfig::new();
    // song_data is nested several directories deep
    session_config
        .options_mut()
        .execution
        .listing_table_ignore_subdirectory = false;
    if let Some(partitions) = config.target_partitions {
        session_config = session_config.with_target_partitions(partitions);
    }
    let ctx = SessionContext::new_with_config(session_config);

    for location in config.storage_locations() {
        match location {
            StorageLocation::S3 { bucket, .. } => {
                let url = Url::parse(&format!("s3://{}", bucket))?;
                let store = build_s3_store(config, bucket)?;
                ctx.register_object_store(&url, Arc::new(store));
                info!(">>> SESSION: ✓ Registered S3 store for {}", url);
            }
            StorageLocation::Local { path } => {
                debug!(">>> SESSION: Local root {} uses the built-in filesystem store", path);
            }
        }
    }

    info!(
        ">>> SESSION: ✓ Session ready (target_partitions={})",
        ctx.copied_config().target_partitions()
    );
    Ok(ctx)
}

/// Build the S3 store for one bucket
pub fn build_s3_store(config: &LakeConfig, bucket: &str) -> Result<AmazonS3> {
    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(&config.aws_region)
        .with_access_key_id(&config.aws_access_key_id)
        .with_secret_access_key(&config.aws_secret_access_key)
        .with_allow_http(config.aws_allow_http);

    if let Some(endpoint) = &config.aws_endpoint {
        builder = builder.with_endpoint(endpoint);
    }

    let store = builder.build().map_err(|e| {
        LakeError::ConfigError(format!("Failed to build S3 store for {}: {}", bucket, e))
    })?;
    Ok(store)
}
